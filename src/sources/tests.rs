use super::*;
use tempfile::TempDir;

#[test]
fn category_file_names() {
    let store = ArticleStore::new("/data/articles");

    assert_eq!(
        store.path_for("Acme", SourceKind::News),
        PathBuf::from("/data/articles/Acme_news.json")
    );
    assert_eq!(
        store.path_for("cloud computing", SourceKind::SocialTrends),
        PathBuf::from("/data/articles/cloud computing_social_trends.json")
    );
    assert_eq!(
        store.trend_path("Acme", "weekly"),
        PathBuf::from("/data/articles/google_trends_acme_weekly.json")
    );
}

#[test]
fn path_separators_in_keywords_are_replaced() {
    let store = ArticleStore::new("/data/articles");
    assert_eq!(
        store.path_for("AI/ML", SourceKind::Reddit),
        PathBuf::from("/data/articles/AI_ML_reddit.json")
    );
    assert_eq!(
        store.path_for("..\\etc", SourceKind::Stock),
        PathBuf::from("/data/articles/.._etc_stock.json")
    );
}

#[test]
fn missing_file_loads_as_none() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path());

    let loaded: Option<Vec<NewsArticle>> = store
        .load("Acme", SourceKind::News)
        .expect("missing file is not an error");
    assert!(loaded.is_none());
    assert!(
        store
            .load_trend("Acme", "weekly")
            .expect("missing trend is not an error")
            .is_none()
    );
}

#[test]
fn save_then_load_records() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path().join("articles"));

    let articles = vec![NewsArticle {
        title: "Acme raises funding".to_string(),
        url: "https://news.example.com/acme".to_string(),
        published_at: "2024-05-01T12:00:00Z".to_string(),
        ..NewsArticle::default()
    }];

    let path = store
        .save("Acme", SourceKind::News, &articles)
        .expect("should save articles");
    assert!(path.exists());

    let raw = std::fs::read_to_string(&path).expect("should read file");
    assert!(raw.contains("\"publishedAt\""));

    let loaded: Option<Vec<NewsArticle>> =
        store.load("Acme", SourceKind::News).expect("should load");
    assert_eq!(loaded, Some(articles));
}

#[test]
fn malformed_file_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path());
    std::fs::write(store.path_for("Acme", SourceKind::Stock), "{ not json")
        .expect("should write file");

    let loaded: Result<Option<Vec<PricePoint>>> = store.load("Acme", SourceKind::Stock);
    assert!(loaded.is_err());
}

#[test]
fn records_tolerate_missing_fields() {
    let post: RedditPost =
        serde_json::from_str(r#"{"title": "Only a title"}"#).expect("should parse");
    assert_eq!(post.title, "Only a title");
    assert!(post.selftext.is_empty());
    assert_eq!(post.score, 0);
}

#[test]
fn source_kind_names_round_trip() {
    for kind in SourceKind::ALL {
        let parsed: SourceKind = kind.as_str().parse().expect("known kind should parse");
        assert_eq!(parsed, kind);

        let json = serde_json::to_string(&kind).expect("should serialize");
        assert_eq!(json, format!("\"{}\"", kind.as_str()));
    }
    assert!("twitter".parse::<SourceKind>().is_err());
}

#[test]
fn social_search_is_always_enabled() {
    let config = SourcesConfig {
        newsapi_key_env: "MARKET_BRIEF_TEST_NO_NEWS_KEY".to_string(),
        alpha_vantage_key_env: "MARKET_BRIEF_TEST_NO_AV_KEY".to_string(),
        producthunt_app_id_env: "MARKET_BRIEF_TEST_NO_PH_APP".to_string(),
        producthunt_api_key_env: "MARKET_BRIEF_TEST_NO_PH_KEY".to_string(),
        ..SourcesConfig::default()
    };

    let collectors = collectors_from_config(&config).expect("should build collectors");
    let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["reddit"]);
    assert!(price_history_from_config(&config).is_none());
}

#[test]
fn clear_collected_keeps_trends_and_other_keywords() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path());

    store
        .save("Acme", SourceKind::News, &Vec::<NewsArticle>::new())
        .expect("should save news");
    store
        .save("Acme", SourceKind::Stock, &Vec::<PricePoint>::new())
        .expect("should save prices");
    store
        .save("Globex", SourceKind::News, &Vec::<NewsArticle>::new())
        .expect("should save news");
    fs::write(store.trend_path("Acme", "weekly"), "{}").expect("should write trend");

    assert_eq!(store.clear_collected("Acme").expect("should clear"), 2);
    assert!(!store.path_for("Acme", SourceKind::News).exists());
    assert!(!store.path_for("Acme", SourceKind::Stock).exists());
    assert!(store.path_for("Globex", SourceKind::News).exists());
    assert!(store.trend_path("Acme", "weekly").exists());

    assert_eq!(store.clear_collected("Acme").expect("should clear"), 0);
}
