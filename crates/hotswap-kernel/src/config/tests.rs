use super::*;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Deserialize, PartialEq)]
struct WatchSettings {
    directory: PathBuf,
    extension: String,
    #[serde(default)]
    debug_extension: Option<String>,
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_detect_format() {
    assert_eq!(detect_format(Path::new("hotswap.toml")).unwrap(), FileFormat::Toml);
    assert_eq!(detect_format(Path::new("hotswap.yaml")).unwrap(), FileFormat::Yaml);
    assert_eq!(detect_format(Path::new("hotswap.YML")).unwrap(), FileFormat::Yaml);
    assert_eq!(detect_format(Path::new("hotswap.json")).unwrap(), FileFormat::Json);
    assert!(matches!(
        detect_format(Path::new("hotswap.ini")),
        Err(ConfigError::UnsupportedFormat(_))
    ));
    assert!(detect_format(Path::new("hotswap")).is_err());
}

#[test]
fn test_from_str_each_format() {
    let toml = r#"
directory = "plugins"
extension = "so"
"#;
    let yaml = "directory: plugins\nextension: so\n";
    let json = r#"{ "directory": "plugins", "extension": "so" }"#;

    let expected = WatchSettings {
        directory: PathBuf::from("plugins"),
        extension: "so".to_string(),
        debug_extension: None,
    };

    assert_eq!(from_str::<WatchSettings>(toml, FileFormat::Toml).unwrap(), expected);
    assert_eq!(from_str::<WatchSettings>(yaml, FileFormat::Yaml).unwrap(), expected);
    assert_eq!(from_str::<WatchSettings>(json, FileFormat::Json).unwrap(), expected);
}

#[test]
fn test_substitute_env_vars() {
    // SAFETY: the variable name is unique to this test.
    unsafe { std::env::set_var("HOTSWAP_TEST_SUBST_DIR", "/srv/plugins") };

    let out = substitute_env_vars("directory = \"${HOTSWAP_TEST_SUBST_DIR}\"");
    assert_eq!(out, "directory = \"/srv/plugins\"");

    let untouched = substitute_env_vars("directory = \"${HOTSWAP_TEST_UNSET_VAR}\"");
    assert_eq!(untouched, "directory = \"${HOTSWAP_TEST_UNSET_VAR}\"");
}

#[test]
fn test_load_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "hotswap.toml",
        "directory = \"saves/plugins\"\nextension = \"dll\"\ndebug_extension = \"pdb\"\n",
    );

    let settings: WatchSettings = load_config(&path).unwrap();
    assert_eq!(settings.directory, PathBuf::from("saves/plugins"));
    assert_eq!(settings.extension, "dll");
    assert_eq!(settings.debug_extension.as_deref(), Some("pdb"));
}

#[test]
fn test_load_config_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_config::<WatchSettings>(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_load_config_reports_bad_content() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.json", "{ \"directory\": ");
    assert!(matches!(
        load_config::<WatchSettings>(&path),
        Err(ConfigError::Parse(_))
    ));

    let path = write(&dir, "incomplete.toml", "directory = \"plugins\"\n");
    assert!(matches!(
        load_config::<WatchSettings>(&path),
        Err(ConfigError::Deserialize(_))
    ));
}

#[test]
fn test_load_with_env_overrides_file_values() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "hotswap.yaml", "directory: plugins\nextension: so\n");

    // SAFETY: the prefix is unique to this test.
    unsafe { std::env::set_var("HSKTEST__EXTENSION", "dylib") };

    let settings: WatchSettings = load_with_env(&path, "HSKTEST").unwrap();
    assert_eq!(settings.directory, PathBuf::from("plugins"));
    assert_eq!(settings.extension, "dylib");
}
