use serde::{Deserialize, Serialize};

use super::signals::{DecisionFactor, FactorCategory, Signal};

pub const PE_WEIGHT: f64 = 0.15;
pub const MARKET_CAP_WEIGHT: f64 = 0.10;
pub const NEWS_WEIGHT: f64 = 0.15;
pub const SOCIAL_WEIGHT: f64 = 0.10;

const PE_CHEAP: f64 = 15.0;
const PE_EXPENSIVE: f64 = 30.0;

const MEGA_CAP: f64 = 200e9;
const LARGE_CAP: f64 = 10e9;
const SMALL_CAP: f64 = 2e9;

/// |score| below this reads as neutral.
const SENTIMENT_DEADBAND: f64 = 0.2;
const NEWS_STRONG_SCORE: f64 = 0.6;
const NEWS_STRONG_ARTICLES: u32 = 10;
const SOCIAL_MIN_MENTIONS: u32 = 50;
const SOCIAL_LOW_VOLUME_CAP: f64 = 0.6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundamentalData {
    pub pe_ratio: Option<f64>,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSentiment {
    /// -1.0 (very negative) to 1.0 (very positive).
    pub sentiment_score: f64,
    pub article_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialSentiment {
    pub sentiment_score: f64,
    pub mention_count: u32,
}

/// Turns externally supplied records into factors. Missing records, missing
/// fields and zero counts skip the category.
#[derive(Debug, Clone, Default)]
pub struct FundamentalAnalyzer;

impl FundamentalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(
        &self,
        fundamental: Option<&FundamentalData>,
        news: Option<&NewsSentiment>,
        social: Option<&SocialSentiment>,
    ) -> Vec<DecisionFactor> {
        let mut factors = Vec::new();
        if let Some(data) = fundamental {
            factors.extend(data.pe_ratio.and_then(pe_factor));
            factors.extend(data.market_cap.and_then(market_cap_factor));
        }
        factors.extend(news.and_then(news_factor));
        factors.extend(social.and_then(social_factor));
        factors
    }
}

fn pe_factor(pe: f64) -> Option<DecisionFactor> {
    if !pe.is_finite() {
        return None;
    }

    let (signal, confidence, reason) = if pe <= 0.0 {
        (Signal::Sell, 0.5, format!("negative earnings (P/E {:.1})", pe))
    } else if pe < PE_CHEAP {
        (Signal::Buy, 0.7, format!("P/E {:.1} looks undervalued", pe))
    } else if pe > PE_EXPENSIVE {
        (Signal::Sell, 0.6, format!("P/E {:.1} looks expensive", pe))
    } else {
        (Signal::Hold, 0.5, format!("P/E {:.1} is fairly valued", pe))
    };

    Some(
        DecisionFactor::new("P/E Ratio", FactorCategory::Fundamental, signal, confidence, PE_WEIGHT)
            .with_reason(reason),
    )
}

fn market_cap_factor(cap: f64) -> Option<DecisionFactor> {
    if !cap.is_finite() || cap <= 0.0 {
        return None;
    }

    let billions = cap / 1e9;
    let (signal, confidence, reason) = if cap >= MEGA_CAP {
        (Signal::Buy, 0.6, format!("mega cap (${:.0}B)", billions))
    } else if cap >= LARGE_CAP {
        (Signal::Hold, 0.6, format!("large cap (${:.0}B)", billions))
    } else if cap >= SMALL_CAP {
        (Signal::Hold, 0.5, format!("mid cap (${:.1}B)", billions))
    } else {
        (Signal::Hold, 0.4, format!("small cap (${:.2}B), higher risk", billions))
    };

    Some(
        DecisionFactor::new(
            "Market Cap",
            FactorCategory::Fundamental,
            signal,
            confidence,
            MARKET_CAP_WEIGHT,
        )
        .with_reason(reason),
    )
}

fn sentiment_signal(score: f64) -> Signal {
    if score > SENTIMENT_DEADBAND {
        Signal::Buy
    } else if score < -SENTIMENT_DEADBAND {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

fn news_factor(news: &NewsSentiment) -> Option<DecisionFactor> {
    if news.article_count == 0 || !news.sentiment_score.is_finite() {
        return None;
    }
    let score = news.sentiment_score.clamp(-1.0, 1.0);
    let strong = score.abs() > NEWS_STRONG_SCORE && news.article_count >= NEWS_STRONG_ARTICLES;

    let signal = match sentiment_signal(score) {
        Signal::Buy if strong => Signal::StrongBuy,
        Signal::Sell if strong => Signal::StrongSell,
        other => other,
    };
    let confidence = if signal == Signal::Hold {
        0.5
    } else {
        let coverage = (news.article_count as f64 / NEWS_STRONG_ARTICLES as f64).min(1.0);
        score.abs() * (0.5 + 0.5 * coverage)
    };

    Some(
        DecisionFactor::new("News Sentiment", FactorCategory::News, signal, confidence, NEWS_WEIGHT)
            .with_reason(format!(
                "news sentiment {:+.2} across {} article(s)",
                score, news.article_count
            )),
    )
}

fn social_factor(social: &SocialSentiment) -> Option<DecisionFactor> {
    if social.mention_count == 0 || !social.sentiment_score.is_finite() {
        return None;
    }
    let score = social.sentiment_score.clamp(-1.0, 1.0);
    let signal = sentiment_signal(score);

    let mut confidence = if signal == Signal::Hold { 0.5 } else { score.abs() };
    if social.mention_count < SOCIAL_MIN_MENTIONS {
        confidence = confidence.min(SOCIAL_LOW_VOLUME_CAP);
    }

    Some(
        DecisionFactor::new(
            "Social Sentiment",
            FactorCategory::Social,
            signal,
            confidence,
            SOCIAL_WEIGHT,
        )
        .with_reason(format!(
            "social sentiment {:+.2} across {} mention(s)",
            score, social.mention_count
        )),
    )
}
