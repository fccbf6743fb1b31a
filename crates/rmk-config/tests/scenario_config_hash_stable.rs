use rmk_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
daemon:
  addr: "127.0.0.1:8899"
  backend: "postgres"
database:
  url_env: "RMK_DATABASE_URL"
pricing:
  default_currency: "INR"
  supported_currencies: ["INR", "USD", "EUR", "GBP"]
"#;

const BASE_YAML_REORDERED: &str = r#"
pricing:
  supported_currencies: ["INR", "USD", "EUR", "GBP"]
  default_currency: "INR"
database:
  url_env: "RMK_DATABASE_URL"
daemon:
  backend: "postgres"
  addr: "127.0.0.1:8899"
"#;

const OVERLAY_YAML: &str = r#"
daemon:
  backend: "memory"
pricing:
  default_currency: "USD"
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_hash_and_overrides_values() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);
    assert_eq!(merged.config_json["daemon"]["backend"], "memory");
    assert_eq!(merged.config_json["daemon"]["addr"], "127.0.0.1:8899");
    assert_eq!(merged.config_json["pricing"]["default_currency"], "USD");
}

#[test]
fn empty_layers_are_ignored() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}
