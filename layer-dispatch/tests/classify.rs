use layer_dispatch::{
    DispatchError, FileIdCodec, FileType, MediaInput, MediaSource, OpaqueReference, classify,
};

fn reference(file_type: FileType) -> OpaqueReference {
    OpaqueReference {
        file_type,
        dc_id:          2,
        id:             1_000_001,
        access_hash:    -55,
        file_reference: vec![3, 0, 0, 9],
        url:            None,
    }
}

#[test]
fn stream_is_in_memory() {
    let s = classify(MediaInput::stream("a.png", vec![1, 2, 3]), &FileIdCodec, None).unwrap();
    assert_eq!(s, MediaSource::InMemoryStream { name: "a.png".into(), bytes: vec![1, 2, 3] });
    assert!(s.needs_upload());
    assert_eq!(s.mime_type(), "image/png");
}

#[test]
fn existing_file_is_local() {
    let path = std::env::temp_dir().join(format!("layer-dispatch-classify-{}.txt", std::process::id()));
    std::fs::write(&path, b"x").unwrap();
    let s = classify(path.as_path().into(), &FileIdCodec, Some(FileType::Document));
    std::fs::remove_file(&path).unwrap();

    assert_eq!(s.unwrap(), MediaSource::LocalFile { path });
}

#[test]
fn directory_is_not_a_local_file() {
    let dir = std::env::temp_dir();
    let err = classify(dir.as_path().into(), &FileIdCodec, None).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidReference(_)));
}

#[test]
fn http_urls_are_remote() {
    for url in ["https://example.com/a.png", "HTTP://example.com/b.gif?x=1"] {
        let s = classify(url.into(), &FileIdCodec, Some(FileType::Photo)).unwrap();
        assert_eq!(s, MediaSource::RemoteUrl { url: url.into() });
        assert!(!s.needs_upload());
    }
    let s = classify("https://example.com/c.mp4?sig=1".into(), &FileIdCodec, None).unwrap();
    assert_eq!(s.file_name().as_deref(), Some("c.mp4"));
}

#[test]
fn file_id_is_decoded() {
    let id = FileIdCodec.encode(&reference(FileType::Photo));
    let s = classify(id.as_str().into(), &FileIdCodec, Some(FileType::Photo)).unwrap();
    assert_eq!(s, MediaSource::OpaqueReference(reference(FileType::Photo)));
    assert_eq!(s.mime_type(), "application/octet-stream");
}

#[test]
fn classification_is_deterministic() {
    let id = FileIdCodec.encode(&reference(FileType::Video));
    let a = classify(id.as_str().into(), &FileIdCodec, None).unwrap();
    let b = classify(id.as_str().into(), &FileIdCodec, None).unwrap();
    assert_eq!(a, b);
}

#[test]
fn wrong_kind_is_rejected() {
    let id = FileIdCodec.encode(&reference(FileType::Sticker));
    let err = classify(id.into(), &FileIdCodec, Some(FileType::Photo)).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidReference(_)));
}

#[test]
fn download_only_kinds_are_rejected() {
    let id = FileIdCodec.encode(&reference(FileType::ChatPhoto));
    assert!(classify(id.into(), &FileIdCodec, None).is_err());
}

#[test]
fn garbage_is_an_invalid_reference() {
    for s in ["", "definitely/not/here.jpg", "ftp://example.com/x"] {
        let err = classify(s.into(), &FileIdCodec, None).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidReference(_)), "{s:?}");
    }
}
