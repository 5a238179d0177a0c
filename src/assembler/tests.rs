use super::*;
use serde_json::json;
use tempfile::TempDir;

fn store() -> (TempDir, ArticleStore) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArticleStore::new(temp_dir.path());
    (temp_dir, store)
}

fn keywords(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| (*k).to_string()).collect()
}

#[test]
fn zero_max_words_is_rejected() {
    let (_dir, store) = store();
    assert!(matches!(
        ChunkAssembler::new(store, 0),
        Err(ConfigError::InvalidChunkWords(0))
    ));
}

#[test]
fn no_files_yields_no_chunks() {
    let (_dir, store) = store();
    let assembler = ChunkAssembler::new(store, 500).expect("should build assembler");
    assert!(assembler.assemble(&keywords(&["Acme"])).is_empty());
}

#[test]
fn single_news_article_yields_one_chunk() {
    let (_dir, store) = store();
    store
        .save(
            "Acme",
            SourceKind::News,
            &vec![NewsArticle {
                title: "Acme raises funding".to_string(),
                description: "Series B".to_string(),
                ..NewsArticle::default()
            }],
        )
        .expect("should save");

    let assembler = ChunkAssembler::new(store, 500).expect("should build assembler");
    let chunks = assembler.assemble(&keywords(&["Acme"]));

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source, SourceKind::News);
    assert_eq!(chunks[0].keyword, "Acme");
    assert_eq!(chunks[0].text, "[News Article] Acme raises funding Series B");
}

#[test]
fn sources_follow_fixed_order_per_keyword() {
    let (_dir, store) = store();
    for keyword in ["Acme", "Globex"] {
        store
            .save(
                keyword,
                SourceKind::News,
                &vec![NewsArticle {
                    title: format!("{keyword} news"),
                    ..NewsArticle::default()
                }],
            )
            .expect("should save");
        store
            .save(
                keyword,
                SourceKind::Reddit,
                &vec![RedditPost {
                    title: format!("{keyword} post"),
                    ..RedditPost::default()
                }],
            )
            .expect("should save");
    }
    store
        .save(
            "Acme",
            SourceKind::ProductHunt,
            &vec![ProductLaunch {
                name: "Rocket".to_string(),
                ..ProductLaunch::default()
            }],
        )
        .expect("should save");
    store
        .save_trend(
            "Acme",
            "weekly",
            &TrendSummary {
                trend_summary: "Rising".to_string(),
                top_regions: json!([{ "region": "Ohio", "score": 100 }]),
                ..TrendSummary::default()
            },
        )
        .expect("should save");

    let assembler = ChunkAssembler::new(store, 500).expect("should build assembler");
    let chunks = assembler.assemble(&keywords(&["Acme", "Globex"]));

    let order: Vec<(SourceKind, &str)> = chunks
        .iter()
        .map(|c| (c.source, c.keyword.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (SourceKind::Reddit, "Acme"),
            (SourceKind::News, "Acme"),
            (SourceKind::ProductHunt, "Acme"),
            (SourceKind::GoogleTrends, "Acme"),
            (SourceKind::Reddit, "Globex"),
            (SourceKind::News, "Globex"),
        ]
    );
}

#[test]
fn long_documents_are_split() {
    let (_dir, store) = store();
    store
        .save(
            "Acme",
            SourceKind::News,
            &vec![NewsArticle {
                title: "Acme".to_string(),
                full_text: "word ".repeat(25),
                ..NewsArticle::default()
            }],
        )
        .expect("should save");

    let assembler = ChunkAssembler::new(store, 10).expect("should build assembler");
    let chunks = assembler.assemble(&keywords(&["Acme"]));

    // 2 label words + 1 title word + 25 body words
    assert_eq!(chunks.len(), 3);
    assert!(chunks[0].text.starts_with("[News Article] Acme word"));
    assert!(chunks.iter().all(|c| c.source == SourceKind::News));
}

#[test]
fn malformed_file_contributes_nothing() {
    let (_dir, store) = store();
    std::fs::write(store.path_for("Acme", SourceKind::Stock), "{\"not\": \"a list\"}")
        .expect("should write");
    store
        .save(
            "Acme",
            SourceKind::Reddit,
            &vec![RedditPost {
                title: "still here".to_string(),
                ..RedditPost::default()
            }],
        )
        .expect("should save");

    let assembler = ChunkAssembler::new(store, 500).expect("should build assembler");
    let chunks = assembler.assemble(&keywords(&["Acme"]));

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source, SourceKind::Reddit);
}

#[test]
fn news_prefers_full_text() {
    let mut article = NewsArticle {
        title: "Title".to_string(),
        description: "Short description".to_string(),
        full_text: "Full body".to_string(),
        ..NewsArticle::default()
    };
    assert_eq!(news_document(&article), "[News Article]\nTitle\nFull body");

    article.full_text = "  ".to_string();
    assert_eq!(
        news_document(&article),
        "[News Article]\nTitle\nShort description"
    );
}

#[test]
fn social_trend_rendering() {
    let trend = SocialTrend {
        keyword: "Acme".to_string(),
        post_count: 3,
        average_score: 14.5,
        top_titles: vec!["First".to_string(), "Second".to_string()],
    };
    assert_eq!(
        social_trend_document(&trend),
        "[Social Trend Summary for 'Acme']\nPost Count: 3\nAverage Score: 14.5\nTop Posts:\n- First\n- Second"
    );
}

#[test]
fn stock_rendering_keeps_first_ten_points() {
    let points: Vec<PricePoint> = (0..15)
        .map(|i| PricePoint {
            date: format!("2024-05-{:02}", 15 - i),
            ..PricePoint::default()
        })
        .collect();

    let document = stock_document(&points).expect("should render");
    assert!(document.starts_with("[Stock Data]\n["));
    assert!(document.contains("2024-05-15"));
    assert!(document.contains("2024-05-06"));
    assert!(!document.contains("2024-05-05"));
}

#[test]
fn product_launch_rendering() {
    let launch = ProductLaunch {
        name: "Rocket".to_string(),
        tagline: "Fast".to_string(),
        url: "https://ph.example/rocket".to_string(),
        votes: 3,
    };
    assert_eq!(
        product_launch_document(&launch),
        "[Product Hunt]\nRocket\nFast\nhttps://ph.example/rocket"
    );
}

#[test]
fn trend_rendering_lists_regions() {
    let summary = TrendSummary {
        trend_summary: "Interest doubled this week.".to_string(),
        top_regions: json!([
            { "region": "California", "score": 100 },
            { "region": "Texas", "score": 72 }
        ]),
        ..TrendSummary::default()
    };
    assert_eq!(
        trend_document("same_day", &summary),
        "[Google Trends - SAME_DAY]\nInterest doubled this week.\nTop Regions: California (100), Texas (72)"
    );
}

#[test]
fn malformed_regions_use_placeholder() {
    for regions in [
        json!("California"),
        json!(["California", "Texas"]),
        json!([{ "name": "California" }]),
        json!({ "region": "California", "score": 1 }),
    ] {
        let summary = TrendSummary {
            trend_summary: "Flat".to_string(),
            top_regions: regions,
            ..TrendSummary::default()
        };
        assert_eq!(
            trend_document("weekly", &summary),
            "[Google Trends - WEEKLY]\nFlat\nTop Regions: No regional data available."
        );
    }
}
