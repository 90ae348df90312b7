use photocast::config::{Configuration, PhotoOrdering};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
photo-library-path: "/photos"
device-name: "Living Room TV"
local-ip: "192.168.1.50"
listening-port: 9090
blacklist: "priv;Hidden"
photo-index-interval: 1h
cast-check-interval: 20s
next-photo-interval: 45s
ordering: shuffled
shuffle-seed: 7
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.photo_library_path, PathBuf::from("/photos"));
    assert_eq!(cfg.device_name, "Living Room TV");
    assert_eq!(cfg.local_ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)));
    assert_eq!(cfg.listening_port, 9090);
    assert_eq!(cfg.photo_index_interval, Duration::from_secs(3600));
    assert_eq!(cfg.cast_check_interval, Duration::from_secs(20));
    assert_eq!(cfg.next_photo_interval, Duration::from_secs(45));
    assert_eq!(cfg.ordering, PhotoOrdering::Shuffled);
    assert_eq!(cfg.shuffle_seed, Some(7));
}

#[test]
fn defaults_apply_when_omitted() {
    let yaml = r#"
photo-library-path: "/photos"
device-name: "Kitchen Display"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.listening_port, 8080);
    assert_eq!(cfg.ordering, PhotoOrdering::Lexicographic);
    assert_eq!(cfg.shuffle_seed, None);
    assert!(cfg.blacklist.is_empty());
    assert_eq!(cfg.cast_check_interval, Duration::from_secs(30));
    assert_eq!(cfg.next_photo_interval, Duration::from_secs(30));
}

#[test]
fn blacklist_splits_on_delimiter_case_insensitively() {
    let yaml = r#"
photo-library-path: "/photos"
device-name: "TV"
blacklist: "priv; Screenshots"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.blacklist.matches("Private"));
    assert!(cfg.blacklist.matches("screenshots-2024"));
    assert!(!cfg.blacklist.matches("family"));
}

#[test]
fn validated_accepts_complete_config() {
    let cfg = Configuration {
        photo_library_path: PathBuf::from("/photos"),
        device_name: "TV".to_string(),
        ..Default::default()
    };
    assert!(cfg.validated().is_ok());
}

#[test]
fn validated_rejects_missing_library_path() {
    let cfg = Configuration {
        device_name: "TV".to_string(),
        ..Default::default()
    };
    assert!(cfg.validated().is_err());
}

#[test]
fn validated_rejects_blank_device_name() {
    let cfg = Configuration {
        photo_library_path: PathBuf::from("/photos"),
        device_name: "   ".to_string(),
        ..Default::default()
    };
    assert!(cfg.validated().is_err());
}

#[test]
fn validated_rejects_zero_intervals() {
    let cfg = Configuration {
        photo_library_path: PathBuf::from("/photos"),
        device_name: "TV".to_string(),
        next_photo_interval: Duration::ZERO,
        ..Default::default()
    };
    assert!(cfg.validated().is_err());

    let cfg = Configuration {
        photo_library_path: PathBuf::from("/photos"),
        device_name: "TV".to_string(),
        cast_check_interval: Duration::ZERO,
        ..Default::default()
    };
    assert!(cfg.validated().is_err());
}
