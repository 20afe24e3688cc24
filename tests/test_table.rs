use arxiv_digest::paper::Paper;
use arxiv_digest::table::{categories_tag, parse_file_name, TableKey, TableStore};
use chrono::NaiveDate;
use std::fs;
use tempfile::tempdir;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn cats(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn paper(id: &str, summary: Option<&str>) -> Paper {
    Paper {
        id: id.to_string(),
        title: format!("Title of {}", id),
        authors: vec!["Alice Zhang".to_string(), "Bob Li".to_string()],
        abstract_text: "An abstract, with a comma and \"quotes\".".to_string(),
        category: "eess.AS".to_string(),
        published: date("2024-01-10"),
        abs_url: format!("http://arxiv.org/abs/{}v1", id),
        pdf_url: format!("http://arxiv.org/pdf/{}v1", id),
        annotation_url: format!("https://www.alphaxiv.org/abs/{}", id),
        summary: summary.map(str::to_string),
    }
}

#[test]
fn test_file_names_differ_per_category_without_dots() {
    let day = date("2024-01-10");
    let audio = TableKey::new(&cats(&["eess.AS"]), &[], day).file_name();
    let ai = TableKey::new(&cats(&["cs.AI"]), &[], day).file_name();

    assert_eq!(audio, "arxiv_eessAS_2024-01-10.csv");
    assert_eq!(ai, "arxiv_csAI_2024-01-10.csv");
    assert_ne!(audio, ai);
    for name in [&audio, &ai] {
        let stem = name.strip_suffix(".csv").unwrap();
        assert!(!stem.contains('.'), "{} still contains a dot", name);
    }
}

#[test]
fn test_file_name_with_keywords_and_several_categories() {
    let key = TableKey::new(
        &cats(&["cs.AI", "stat.ML"]),
        &cats(&["speech enhancement", "asr"]),
        date("2024-01-10"),
    );
    assert_eq!(key.file_name(), "arxiv_csAI-statML_keywords_speech_enhancement-asr_2024-01-10.csv");
    assert_eq!(categories_tag(&key.categories), "csAI-statML");

    let (cats_tag, keywords, parsed_date) = parse_file_name(&key.file_name()).unwrap();
    assert_eq!(cats_tag, "csAI-statML");
    assert_eq!(keywords.as_deref(), Some("speech_enhancement-asr"));
    assert_eq!(parsed_date, date("2024-01-10"));

    assert!(parse_file_name("notes.csv").is_none());
    assert!(parse_file_name("arxiv_csAI_yesterday.csv").is_none());
}

#[test]
fn test_save_and_load_table() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let path = store.path_for(&TableKey::new(&cats(&["eess.AS"]), &[], date("2024-01-10")));

    let papers = vec![paper("2401.00001", None), paper("2401.00002", Some("已有总结"))];
    store.save(&path, &papers).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("id,title,authors,abstract,category,published,abs_url,pdf_url,annotation_url,summary"));

    let loaded = store.load(&path).unwrap();
    assert_eq!(loaded, papers);
    assert!(!loaded[0].has_summary());
    assert!(loaded[1].has_summary());
}

#[test]
fn test_zero_row_table_loads_empty() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let path = dir.path().join("arxiv_eessAS_2024-01-10.csv");

    store.save(&path, &[]).unwrap();
    assert!(path.is_file());
    assert!(store.load(&path).unwrap().is_empty());

    // A file with nothing in it at all
    fs::write(&path, "").unwrap();
    assert!(store.load(&path).unwrap().is_empty());
}

#[test]
fn test_missing_or_broken_table_is_empty() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());

    let missing = dir.path().join("arxiv_eessAS_2024-01-10.csv");
    assert!(store.load(&missing).is_err());
    assert!(store.load_or_empty(&missing).is_empty());

    let broken = dir.path().join("arxiv_eessAS_2024-01-11.csv");
    fs::write(&broken, "id,title\n\"unterminated").unwrap();
    assert!(store.load_or_empty(&broken).is_empty());
}

#[test]
fn test_find_tables_matches_keyword_variants_only_for_same_categories() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let day = date("2024-01-10");
    let audio = cats(&["eess.AS"]);

    let plain = store.path_for(&TableKey::new(&audio, &[], day));
    let with_keywords = store.path_for(&TableKey::new(&audio, &cats(&["speech"]), day));
    let other_day = store.path_for(&TableKey::new(&audio, &[], date("2024-01-09")));
    let other_category = store.path_for(&TableKey::new(&cats(&["eess.AS", "cs.SD"]), &[], day));
    for path in [&plain, &with_keywords, &other_day, &other_category] {
        store.save(path, &[paper("2401.00001", None)]).unwrap();
    }
    fs::write(dir.path().join("README.txt"), "not a table").unwrap();

    let found = store.find_tables(&audio, day);
    assert_eq!(found.len(), 2);
    assert!(found.contains(&plain));
    assert!(found.contains(&with_keywords));
}

#[test]
fn test_keyword_path_separators_stay_in_data_dir() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let audio = cats(&["eess.AS"]);
    let key = TableKey::new(&audio, &cats(&["TTS/ASR", "v2.0", r"a\b"]), date("2024-01-10"));

    assert_eq!(key.file_name(), "arxiv_eessAS_keywords_TTS_ASR-v20-a_b_2024-01-10.csv");

    let path = store.path_for(&key);
    store.save(&path, &[paper("2401.00001", None)]).unwrap();
    assert_eq!(path.parent(), Some(dir.path()));
    assert_eq!(store.find_tables(&audio, date("2024-01-10")), vec![path]);
}
