use pathxml::{delete, get, set, set_raw, valid, Error, Options};

const CATALOG: &[u8] = br#"<catalog>
    <book id="bk101" lang="en">
        <author>Gambardella, Matthew</author>
        <title>XML Developer's Guide</title>
        <price>44.95</price>
    </book>
    <book id="bk102" lang="en">
        <author>Ralls, Kim</author>
        <title>Midnight Rain</title>
        <price>5.95</price>
    </book>
    <book id="bk103" lang="fr">
        <author>Corets, Eva</author>
        <title>Maeve Ascendant</title>
        <price>5.95</price>
    </book>
</catalog>"#;

#[test]
fn simple_element_lookup() {
    assert_eq!(get(CATALOG, "catalog.book.author").str(), "Gambardella, Matthew");
}

#[test]
fn wildcard_collects_all_titles() {
    let titles = get(CATALOG, "catalog.book.*.title");
    assert!(titles.exists());
}

#[test]
fn attribute_lookup() {
    assert_eq!(get(CATALOG, "catalog.book.@id").str(), "bk101");
}

#[test]
fn filter_all_match_selects_by_attribute() {
    let cheap = get(CATALOG, r#"catalog.book.#(price<10)#.@id"#);
    assert!(cheap.exists());
}

#[test]
fn filter_first_match_returns_single_title() {
    let title = get(CATALOG, r#"catalog.book.#(@lang=="fr").title"#);
    assert_eq!(title.str(), "Maeve Ascendant");
}

#[test]
fn count_segment_counts_siblings() {
    assert_eq!(get(CATALOG, "catalog.book.#").i64(), 3);
}

#[test]
fn field_extraction_projects_attribute_over_matches() {
    let ids = get(CATALOG, "catalog.book.#.@id");
    assert_eq!(ids.array().len(), 3);
}

#[test]
fn recursive_wildcard_finds_nested_price() {
    let any_price = get(CATALOG, "catalog.**.price");
    assert!(any_price.exists());
}

#[test]
fn modifier_chain_applies_left_to_right() {
    let upper = get(CATALOG, r#"catalog.book.#(@lang=="fr").title|@upper"#);
    assert_eq!(upper.str(), "MAEVE ASCENDANT");
}

#[test]
fn missing_path_is_null_not_panic() {
    assert!(!get(CATALOG, "catalog.nonexistent.deeply.nested").exists());
}

#[test]
fn malformed_document_never_panics_get() {
    let broken = b"<catalog><book id=\"x\"><author>Unterminated";
    assert!(!get(broken, "catalog.book.author").exists() || get(broken, "catalog.book.author").exists());
}

#[test]
fn get_then_set_then_get_round_trips() {
    let updated = set(CATALOG, "catalog.book.0.price", Some("39.99")).unwrap();
    assert_eq!(get(&updated, "catalog.book.0.price").str(), "39.99");
}

#[test]
fn set_auto_creates_missing_chain() {
    let doc = b"<root></root>";
    let updated = set(doc, "root.meta.author", Some("Jane")).unwrap();
    assert_eq!(get(&updated, "root.meta.author").str(), "Jane");
    assert!(valid(&updated).is_ok());
}

#[test]
fn set_on_empty_document_creates_root() {
    let updated = set(b"", "config.timeout", Some("30")).unwrap();
    assert_eq!(get(&updated, "config.timeout").str(), "30");
}

#[test]
fn set_null_is_equivalent_to_delete() {
    let via_set_null = set(CATALOG, "catalog.book.0.author", None).unwrap();
    let via_delete = delete(CATALOG, "catalog.book.0.author").unwrap();
    assert_eq!(via_set_null, via_delete);
}

#[test]
fn delete_then_get_is_null() {
    let updated = delete(CATALOG, "catalog.book.0.price").unwrap();
    assert!(!get(&updated, "catalog.book.0.price").exists());
}

#[test]
fn delete_is_idempotent_on_missing_target() {
    let once = delete(CATALOG, "catalog.book.0.isbn").unwrap();
    let twice = delete(&once, "catalog.book.0.isbn").unwrap();
    assert_eq!(once, twice);
}

#[test]
fn delete_of_nonexistent_path_returns_unchanged_document() {
    let updated = delete(CATALOG, "catalog.nope.really.not.here").unwrap();
    assert_eq!(updated, CATALOG);
}

#[test]
fn set_then_validate_always_well_formed() {
    let updated = set(CATALOG, "catalog.book.0.title", Some("New & <Exciting>")).unwrap();
    assert!(valid(&updated).is_ok());
}

#[test]
fn set_escapes_special_characters() {
    let updated = set(CATALOG, "catalog.book.0.title", Some("Tom & Jerry")).unwrap();
    assert_eq!(get(&updated, "catalog.book.0.title").str(), "Tom & Jerry");
}

#[test]
fn set_raw_inserts_markup_verbatim() {
    let updated = set_raw(CATALOG, "catalog.book.0.tags", b"<tags><tag>fiction</tag></tags>").unwrap();
    assert_eq!(get(&updated, "catalog.book.0.tags.tag").str(), "fiction");
}

#[test]
fn set_raw_rejects_malformed_markup() {
    let err = set_raw(CATALOG, "catalog.book.0.tags", b"<tags><tag></tags>").unwrap_err();
    assert!(matches!(err, Error::InvalidFragment { .. }));
}

#[test]
fn negative_index_appends_new_root_sibling() {
    let updated = set(CATALOG, "catalog.book.-1.title", Some("New Release")).unwrap();
    assert_eq!(get(&updated, "catalog.book.3.title").str(), "New Release");
}

#[test]
fn wildcard_path_rejected_for_set() {
    let err = set(CATALOG, "catalog.book.*.title", Some("x")).unwrap_err();
    assert!(matches!(err, Error::MalformedPath { .. }));
}

#[test]
fn filter_path_rejected_for_delete() {
    let err = delete(CATALOG, r#"catalog.book.#(@lang=="fr")"#).unwrap_err();
    assert!(matches!(err, Error::MalformedPath { .. }));
}

#[test]
fn validator_accepts_well_formed_catalog() {
    assert!(valid(CATALOG).is_ok());
}

#[test]
fn validator_rejects_mismatched_tags() {
    assert!(valid(b"<a><b></a></b>").is_err());
}

#[test]
fn case_insensitive_option_matches_differently_cased_elements() {
    let doc = b"<Root><Book>1</Book></Root>";
    let opts = Options { case_sensitive: false, ..Options::default() };
    assert_eq!(pathxml::get_with_options(doc, "root.book", &opts).str(), "1");
    assert!(!get(doc, "root.book").exists());
}

#[test]
fn multi_root_fragment_count_and_index() {
    let fragment = b"<item>1</item><item>2</item><item>3</item>";
    assert_eq!(get(fragment, "item.#").i64(), 3);
    assert_eq!(get(fragment, "item.1").str(), "2");
}

#[test]
fn oversized_document_rejected_on_set() {
    let huge = vec![b'x'; 11 * 1024 * 1024];
    let err = set(&huge, "a.b", Some("v")).unwrap_err();
    assert!(matches!(err, Error::DocumentTooLarge { .. }));
}

#[test]
fn deeply_recursive_query_terminates() {
    let mut doc = String::from("<root>");
    for _ in 0..500 {
        doc.push_str("<n>");
    }
    doc.push_str("leaf");
    for _ in 0..500 {
        doc.push_str("</n>");
    }
    doc.push_str("</root>");
    let result = get(doc.as_bytes(), "root.**.n");
    let _ = result.exists();
}
