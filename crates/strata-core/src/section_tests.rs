use super::*;

fn v(raw: &str) -> ConfigValue {
    ConfigValue::set(raw)
}

fn raw_values(section: &Section, key: &str) -> Vec<String> {
    section.values(key).map(|v| v.raw().to_string()).collect()
}

#[test]
fn set_replaces_all_values_in_first_position() {
    let mut s = Section::new("Core");
    s.append("Paths", v("a"));
    s.append("Other", v("x"));
    s.append("Paths", v("b"));
    s.set("Paths", v("c"));

    assert_eq!(raw_values(&s, "Paths"), vec!["c"]);
    assert_eq!(s.keys(), vec!["Paths", "Other"]);
}

#[test]
fn append_keeps_duplicates_add_unique_does_not() {
    let mut s = Section::new("Core");
    s.append("Paths", v("a"));
    s.append("Paths", v("a"));
    assert_eq!(raw_values(&s, "Paths").len(), 2);

    let mut s = Section::new("Core");
    assert!(s.add_unique("Paths", v("a")));
    assert!(!s.add_unique("Paths", v("a")));
    assert_eq!(raw_values(&s, "Paths"), vec!["a"]);
}

#[test]
fn remove_deletes_every_equal_value() {
    let mut s = Section::new("Core");
    s.append("Paths", v("a"));
    s.append("Paths", v("b"));
    s.append("Paths", v("a"));
    assert_eq!(s.remove_value("Paths", &v("a")), 2);
    assert_eq!(raw_values(&s, "Paths"), vec!["b"]);
    assert_eq!(s.remove_value("Paths", &v("zzz")), 0);
}

#[test]
fn clear_and_initialize_to_empty_are_distinct_states() {
    let mut s = Section::new("Core");
    s.append("Paths", v("a"));
    s.initialize_to_empty("Paths");
    assert!(!s.contains("Paths"));
    assert!(s.is_initialized_empty("Paths"));
    assert!(!s.is_empty());

    assert!(s.clear_key("Paths"));
    assert!(!s.is_initialized_empty("Paths"));
    assert!(s.is_empty());
    assert!(!s.clear_key("Paths"));
}

#[test]
fn struct_keyed_literal_declares_first_field_and_replaces_in_place() {
    let mut s = Section::new("Game");
    s.apply_struct_keyed("Row", v("Id=5,Name=A")).unwrap();
    s.apply_struct_keyed("Row", v("Id=7,Name=C")).unwrap();
    s.apply_struct_keyed("Row", v("Id=5,Name=B")).unwrap();

    assert_eq!(s.struct_key("Row"), Some("Id"));
    assert_eq!(raw_values(&s, "Row"), vec!["Id=5,Name=B", "Id=7,Name=C"]);
}

#[test]
fn declared_identity_applies_to_plain_adds() {
    let mut s = Section::new("Game");
    s.apply_struct_keyed("Maps", v("Name")).unwrap();
    s.append("Maps", v("(Name=\"Arena\",Size=1)"));
    s.add_unique("Maps", v("(Name=\"Docks\",Size=2)"));
    s.add_unique("Maps", v("(Name=\"Arena\",Size=9)"));
    s.set("Maps", v("(Name=\"Docks\",Size=3)"));

    assert_eq!(
        raw_values(&s, "Maps"),
        vec!["(Name=\"Arena\",Size=9)", "(Name=\"Docks\",Size=3)"]
    );
}

#[test]
fn struct_keyed_rejects_unparseable_identity() {
    let mut s = Section::new("Game");
    assert!(s.apply_struct_keyed("Row", v("(=5)")).is_err());
    s.apply_struct_keyed("Row", v("Id")).unwrap();
    assert!(s.apply_struct_keyed("Row", v("(Name=A)")).is_err());
    assert!(s.apply_struct_keyed("Row", v("bad field")).is_err());
    assert!(!s.contains("Row"));
}

#[test]
fn extract_field_respects_boundaries_and_quotes() {
    assert_eq!(extract_field("(Id=5,Name=A)", "Id").as_deref(), Some("5"));
    assert_eq!(extract_field("(GridId=5,Id=6)", "Id").as_deref(), Some("6"));
    assert_eq!(
        extract_field("(Name=\"a, b\",Id=1)", "Name").as_deref(),
        Some("a, b")
    );
    assert_eq!(extract_field("(Name=)", "Name"), None);
    assert_eq!(extract_field("(Other=1)", "Name"), None);
}

#[test]
fn extract_field_steps_over_non_ascii_prefixes() {
    assert_eq!(extract_field("(Äx=1,Ä=2)", "Ä").as_deref(), Some("2"));
    assert_eq!(extract_field("(ÄÖ=1)", "Ö"), None);

    let mut section = Section::new("S");
    section.apply_struct_keyed("Rows", ConfigValue::set("Ä")).unwrap();
    section.append("Rows", ConfigValue::new("(Äx=1,Ä=2)", ValueOp::Append));
    section.append("Rows", ConfigValue::new("(Äx=9,Ä=2)", ValueOp::Append));
    let rows: Vec<&str> = section.values("Rows").map(|v| v.raw()).collect();
    assert_eq!(rows, vec!["(Äx=9,Ä=2)"]);
}

#[test]
fn first_field_handles_parentheses() {
    assert_eq!(first_field("(Id=5,Name=A)").as_deref(), Some("Id"));
    assert_eq!(first_field(" Key = 1").as_deref(), Some("Key"));
    assert_eq!(first_field("=1"), None);
}

#[test]
fn replace_values_keeps_first_position_and_drops_marker() {
    let mut s = Section::new("Core");
    s.append("A", v("1"));
    s.append("B", v("x"));
    s.append("A", v("2"));
    s.initialize_to_empty("C");
    s.replace_values("A", vec![v("3"), v("4")]);
    s.replace_values("C", vec![v("c")]);

    assert_eq!(s.keys(), vec!["A", "B", "C"]);
    assert_eq!(raw_values(&s, "A"), vec!["3", "4"]);
    assert!(!s.is_initialized_empty("C"));
}

#[test]
fn equality_ignores_interleaving_of_keys() {
    let mut a = Section::new("Core");
    a.append("A", v("1"));
    a.append("B", v("x"));
    a.append("A", v("2"));

    let mut b = Section::new("Core");
    b.append("B", v("x"));
    b.append("A", v("1"));
    b.append("A", v("2"));
    assert_eq!(a, b);

    let mut c = Section::new("Core");
    c.append("A", v("2"));
    c.append("A", v("1"));
    c.append("B", v("x"));
    assert_ne!(a, c);
}

#[test]
fn lookups_outlive_the_key_string() {
    let mut s = Section::new("Core");
    s.append("K", v("1"));
    s.append("K", v("2"));
    let (first, all) = {
        let key = String::from("K");
        (s.first(&key), s.values(&key).collect::<Vec<_>>())
    };
    assert_eq!(first.map(|v| v.raw()), Some("1"));
    assert_eq!(all.len(), 2);

    let mut file = crate::file::ConfigFile::new("Game");
    file.apply_stream(&crate::parser::parse_stream("t", "[S]\n+Arr=a\n"));
    let values = {
        let section = String::from("S");
        let key = String::from("Arr");
        file.array(&section, &key)
    };
    assert_eq!(values.map(|v| v.len()), Some(1));
}
