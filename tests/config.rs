//! Linkers configured from TOML

mod common;

use std::fs;
use std::sync::Arc;

use common::*;
use dynlink::*;

#[test]
fn test_monomorphic_config_builds_monomorphic_sites() {
    let config = LinkerConfig::from_toml_str(
        r#"
        site_policy = "monomorphic"
        sync_on_relink = true
        "#,
    )
    .unwrap();
    let linker = DynamicLinkerFactory::from_config(&config).build().unwrap();
    assert_eq!(linker.site_policy(), SitePolicy::Monomorphic);
    assert!(linker.sync_on_relink());

    let site = color_site(&linker);
    let p = palette();
    site.invoke(&[p.red.clone()]).unwrap();
    site.invoke(&[p.blue.clone()]).unwrap();
    assert_eq!(site.stats().chain_length, 1);
}

#[test]
fn test_megamorphic_eviction_from_config() {
    let config = LinkerConfig::from_toml_str(
        r#"
        max_chain_length = 2
        eviction = "megamorphic"
        unstable_relink_threshold = 0
        "#,
    )
    .unwrap();
    let linker = DynamicLinkerFactory::from_config(&config).build().unwrap();
    let site = color_site(&linker);

    for (i, shade) in shades(3).iter().enumerate() {
        assert_eq!(
            site.invoke(&[shade.clone()]),
            Ok(Value::str(format!("shade-{}", i)))
        );
    }
    assert_eq!(site.state(), LinkState::Megamorphic);
}

#[test]
fn test_discovery_scope_from_config() {
    let records = Arc::new(RecordLinker::new());
    let registry = LinkerRegistry::new().with(Arc::new(RecordExporter {
        scope: Some("records-runtime"),
        linker: records,
    }));
    let config = LinkerConfig::default().with_discovery_scope("records-runtime");
    let linker = DynamicLinkerFactory::from_config(&config)
        .registry(registry)
        .build()
        .unwrap();
    assert_eq!(linker.linker_names(), vec!["record", "host"]);
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("dynlink-config-{}.toml", std::process::id()));
    fs::write(&path, "max_chain_length = 3\nmember_cache_capacity = 16\n").unwrap();

    let config = LinkerConfig::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(
        config.site_policy(),
        SitePolicy::Chained {
            max_chain_length: 3,
            eviction: EvictionPolicy::Fifo,
        }
    );
    assert_eq!(config.member_cache_capacity, 16);
}

#[test]
fn test_load_reports_missing_file() {
    let path = std::env::temp_dir().join("dynlink-config-does-not-exist.toml");
    let err = LinkerConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("dynlink-config-does-not-exist.toml"));
}

#[test]
fn test_rejects_unknown_and_invalid_keys() {
    assert!(matches!(
        LinkerConfig::from_toml_str("max_chain = 3"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        LinkerConfig::from_toml_str("max_chain_length = 0"),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        LinkerConfig::from_toml_str("eviction = \"lru\""),
        Err(ConfigError::Parse(_))
    ));
}
