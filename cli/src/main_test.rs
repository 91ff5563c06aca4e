use super::*;
use clap::CommandFactory;
use time::Duration;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn generate_flags_parse() {
    let cli = Cli::try_parse_from([
        "deckgen",
        "--endpoint",
        "http://127.0.0.1:9000/generate",
        "generate",
        "--text",
        "Quarterly results and the road ahead",
        "--slides",
        "12",
        "--provider",
        "gemini",
        "--api-key",
        "sk-test-123",
        "--out",
        "decks",
    ])
    .unwrap();
    assert_eq!(cli.endpoint.as_deref(), Some("http://127.0.0.1:9000/generate"));
    let Command::Generate(args) = cli.command else {
        panic!("expected generate");
    };
    assert_eq!(args.slides.as_deref(), Some("12"));
    assert_eq!(args.provider.as_deref(), Some("gemini"));
    assert_eq!(args.out, PathBuf::from("decks"));
    assert!(!args.reuse_images);
}

#[test]
fn text_and_text_file_conflict() {
    let err = Cli::try_parse_from(["deckgen", "generate", "--text", "a", "--text-file", "b.txt"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
}

#[test]
fn history_show_takes_an_id() {
    let cli = Cli::try_parse_from(["deckgen", "history", "show", "1717000000000"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::History(HistoryCommand { command: HistorySubcommand::Show { id: 1_717_000_000_000 } })
    ));
}

#[test]
fn text_over_limit_is_refused() {
    assert!(check_text_len(&"a".repeat(MAX_TEXT_CHARS)).is_ok());
    let err = check_text_len(&"a".repeat(MAX_TEXT_CHARS + 1)).unwrap_err();
    assert!(matches!(err, CliError::TextTooLong { chars } if chars == MAX_TEXT_CHARS + 1));
}

#[test]
fn reads_text_from_file() {
    let dir = std::env::temp_dir().join(format!("deckgen-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("input.txt");
    std::fs::write(&path, "notes from the offsite").unwrap();
    let text = read_input_text(None, path.to_str()).unwrap();
    assert_eq!(text.as_deref(), Some("notes from the offsite"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn no_text_source_is_none() {
    assert!(read_input_text(None, None).unwrap().is_none());
}

#[test]
fn mask_key_keeps_four_characters() {
    assert_eq!(mask_key(""), "(not set)");
    assert_eq!(mask_key("sk-"), "sk-");
    assert_eq!(mask_key("sk-abcdefg"), "sk-a******");
}

#[test]
fn format_age_buckets() {
    let now = OffsetDateTime::UNIX_EPOCH + Duration::days(30);
    assert_eq!(format_age(now, now - Duration::seconds(5)), "just now");
    assert_eq!(format_age(now, now - Duration::minutes(7)), "7m ago");
    assert_eq!(format_age(now, now - Duration::hours(3)), "3h ago");
    assert_eq!(format_age(now, now - Duration::days(2)), "2d ago");
}

#[test]
fn history_line_tolerates_bad_timestamp() {
    let record = HistoryRecord {
        id: 42,
        title: "Roadmap".to_owned(),
        timestamp: "yesterday".to_owned(),
        slides: 8,
        provider: "openai".to_owned(),
        model: "gpt-4o".to_owned(),
        text: String::new(),
        guidance: String::new(),
    };
    let line = history_line(&record, OffsetDateTime::now_utc());
    assert!(line.contains("unknown"));
    assert!(line.contains("openai/gpt-4o"));
    assert!(line.ends_with("Roadmap"));
}
