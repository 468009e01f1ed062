use mobile::{convert, ConvertOptions, Error, MlModel};
use tempfile::{tempdir, NamedTempFile};
use trained_model::reference::mnist_cnn_seeded;

fn package() -> MlModel {
    let options = ConvertOptions::default()
        .with_input_name("image")
        .with_image_input("image");
    convert(&mnist_cnn_seeded(11).unwrap(), &options).unwrap()
}

#[test]
fn metadata_defaults_to_empty() {
    let package = package();
    assert_eq!(package.author(), "");
    assert_eq!(package.license(), "");
    assert_eq!(package.short_description(), "");
    assert_eq!(package.input_description("image"), Some(""));
    assert_eq!(package.input_description("missing"), None);
}

#[test]
fn metadata_setters() {
    let mut package = package();
    package.set_author("someone");
    package.set_license("Apache-2.0");
    package.set_short_description("digits");
    package.set_input_description("image", "a picture").unwrap();
    package.set_output_description("output1", "scores").unwrap();

    assert_eq!(package.author(), "someone");
    assert_eq!(package.license(), "Apache-2.0");
    assert_eq!(package.short_description(), "digits");
    assert_eq!(package.input_description("image"), Some("a picture"));
    assert_eq!(package.output_description("output1"), Some("scores"));

    package.set_author("someone else");
    assert_eq!(package.author(), "someone else");
}

#[test]
fn describing_unknown_feature_fails() {
    let mut package = package();
    let err = package.set_input_description("output1", "wrong side").unwrap_err();
    assert!(matches!(err, Error::UnknownFeature { kind: "input", ref name } if name == "output1"));
    let err = package.set_output_description("probabilities", "nope").unwrap_err();
    assert!(matches!(err, Error::UnknownFeature { kind: "output", .. }));
}

#[test]
fn test_save_and_load() -> mobile::Result<()> {
    let mut package = package();
    package.set_author("someone");
    package.set_input_description("image", "a picture")?;

    let file = NamedTempFile::new()?;
    package.save(file.path())?;
    let loaded = MlModel::load(file.path())?;
    assert_eq!(loaded, package);
    assert_eq!(loaded.author(), "someone");
    assert_eq!(loaded.input_description("image"), Some("a picture"));
    Ok(())
}

#[test]
fn save_replaces_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.mlmodel");
    std::fs::write(&path, b"stale").unwrap();

    let package = package();
    package.save(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), package.to_bytes().unwrap());
    // only the saved file remains, no leftover temporary
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn save_into_missing_directory_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope").join("model.mlmodel");
    assert!(matches!(package().save(&path), Err(Error::Io(_))));
    assert!(!path.exists());
}

#[test]
fn garbage_bytes_are_rejected() {
    assert!(matches!(
        MlModel::from_bytes(&[0xff, 0xff, 0xff]),
        Err(Error::Protobuf(_))
    ));
}

#[cfg(unix)]
#[test]
fn new_package_gets_default_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain");
    std::fs::write(&plain, b"x").unwrap();
    let path = dir.path().join("model.mlmodel");
    package().save(&path).unwrap();

    let mode = |p: &std::path::Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode(&path), mode(&plain));
}

#[cfg(unix)]
#[test]
fn replaced_package_keeps_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.mlmodel");
    std::fs::write(&path, b"stale").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

    package().save(&path).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);
}
