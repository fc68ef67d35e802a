use chrono::{Duration, TimeZone, Utc};
use market_decision_engine::api::{Bar, DataSource, Quote};
use market_decision_engine::strategy::indicators::Indicators;
use market_decision_engine::strategy::{
    CandlestickAnalyzer, DecisionEngine, DecisionFactor, FactorAggregator, FactorCategory,
    FundamentalData, NewsSentiment, Signal, SocialSentiment,
};
use pretty_assertions::assert_eq;

fn bars(closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 20, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let open = c + 0.3;
            Bar::new(start + Duration::days(i as i64), open, open + 0.5, c - 0.5, *c, 1_000_000.0)
        })
        .collect()
}

fn quote(symbol: &str, price: f64) -> Quote {
    let mut q = Quote::new(symbol, price, DataSource::Yahoo);
    q.timestamp = Some(Utc::now());
    q
}

#[test]
fn declining_series_produces_oversold_buy() {
    let closes: Vec<f64> = (0..20).map(|i| 150.0 - 1.5 * i as f64).collect();
    let history = bars(&closes);

    let rsi = Indicators::from_bars(&history).rsi(14).unwrap();
    assert!(rsi < 30.0, "rsi {}", rsi);

    let decision = DecisionEngine::default()
        .get_decision("AAPL", &quote("AAPL", 121.0), &history, None, None, None)
        .unwrap();

    let rsi_factor = decision
        .factors
        .iter()
        .find(|f| f.name == "RSI")
        .expect("RSI factor");
    assert_eq!(rsi_factor.signal, Signal::Buy);
    assert_eq!(rsi_factor.category, FactorCategory::Technical);
}

#[test]
fn no_factors_is_the_degenerate_hold() {
    let decision = FactorAggregator::default().aggregate("AAPL", Vec::new(), &[]);
    assert_eq!(
        (decision.signal, decision.confidence, decision.risk_score, decision.position_size),
        (Signal::Hold, 0.0, 1.0, 0.0)
    );
    assert!(decision.factors.is_empty());
}

#[test]
fn unanimous_buy_beats_every_single_contribution() {
    let weights = [0.15, 0.20, 0.15, 0.10];
    let factors: Vec<DecisionFactor> = weights
        .iter()
        .map(|w| DecisionFactor::new("vote", FactorCategory::Technical, Signal::Buy, 0.8, *w))
        .collect();
    let best_single = factors
        .iter()
        .map(|f| f.contribution())
        .fold(0.0_f64, f64::max);

    let decision = FactorAggregator::default().aggregate("MSFT", factors, &bars(&[100.0; 30]));
    assert_eq!(decision.signal, Signal::Buy);
    assert!(decision.confidence > best_single);
    assert!(decision.position_size > 0.0 && decision.position_size <= 0.25);
}

#[test]
fn doji_bar_is_reported_with_high_confidence() {
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 20, 0, 0).unwrap();
    let doji = Bar::new(start, 100.0, 102.0, 98.0, 100.1, 1_000.0);

    let factors = CandlestickAnalyzer::new().analyze(&[doji]);
    let factor = factors.iter().find(|f| f.name == "Doji").expect("doji");
    assert!(factor.confidence > 0.8);
    assert_eq!(factor.signal, Signal::Hold);
}

#[test]
fn optional_inputs_add_their_categories() {
    let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.4).sin() * 3.0).collect();
    let history = bars(&closes);
    let last = *closes.last().unwrap();
    let engine = DecisionEngine::default();

    let bare = engine
        .get_decision("NVDA", &quote("NVDA", last), &history, None, None, None)
        .unwrap();

    let fundamental = FundamentalData {
        pe_ratio: Some(45.0),
        market_cap: Some(1.2e12),
    };
    let news = NewsSentiment {
        sentiment_score: 0.75,
        article_count: 25,
    };
    let social = SocialSentiment {
        sentiment_score: 0.4,
        mention_count: 12,
    };
    let full = engine
        .get_decision(
            "NVDA",
            &quote("NVDA", last),
            &history,
            Some(&fundamental),
            Some(&news),
            Some(&social),
        )
        .unwrap();

    assert_eq!(full.factors.len(), bare.factors.len() + 4);
    let category = |c: FactorCategory| full.factors.iter().filter(|f| f.category == c).count();
    assert_eq!(category(FactorCategory::Fundamental), 2);
    assert_eq!(category(FactorCategory::News), 1);
    assert_eq!(category(FactorCategory::Social), 1);

    let news_factor = full
        .factors
        .iter()
        .find(|f| f.category == FactorCategory::News)
        .unwrap();
    assert_eq!(news_factor.signal, Signal::StrongBuy);

    let social_factor = full
        .factors
        .iter()
        .find(|f| f.category == FactorCategory::Social)
        .unwrap();
    assert!(social_factor.confidence <= 0.6);
}

#[test]
fn decisions_serialize_for_collaborators() {
    let closes: Vec<f64> = (0..20).map(|i| 150.0 - 1.5 * i as f64).collect();
    let decision = DecisionEngine::default()
        .get_decision("AAPL", &quote("AAPL", 121.0), &bars(&closes), None, None, None)
        .unwrap();

    let json = serde_json::to_value(&decision).unwrap();
    assert_eq!(json["symbol"], "AAPL");
    assert!(json["signal"].is_string());
    assert!(json["factors"].as_array().map(|f| !f.is_empty()).unwrap_or(false));
    assert!(json["reasoning"].as_str().unwrap().contains("factors"));
}
