use anyhow::Result;
use aura_sentinel_domain::{
    AssetKind, AssetStatus, InvoiceStats, MarketConditions, PerceptionBundle, RwaAsset,
};
use serde_json::{Map, Value};

#[must_use]
pub fn fixture_assets() -> Vec<RwaAsset> {
    vec![
        RwaAsset {
            id: "INV-2024-001".to_string(),
            kind: AssetKind::Invoice,
            value: 54_000.00,
            currency: "USD".to_string(),
            issuer: "Acme Logistics LLC".to_string(),
            risk_score: 12,
            status: AssetStatus::Tokenized,
            metadata_hash: "QmX7...9a2".to_string(),
        },
        RwaAsset {
            id: "BND-EU-882".to_string(),
            kind: AssetKind::Bond,
            value: 1_250_000.00,
            currency: "EUR".to_string(),
            issuer: "Global Green Energy".to_string(),
            risk_score: 45,
            status: AssetStatus::Pending,
            metadata_hash: "QmY8...b31".to_string(),
        },
    ]
}

#[must_use]
pub fn perception_bundle() -> PerceptionBundle {
    PerceptionBundle {
        invoice_data: InvoiceStats {
            line_items: 12,
            tax_code: "US-CA-550".to_string(),
            previous_defaults: 0,
            days_outstanding: 15,
        },
        market_conditions: MarketConditions {
            volatility_index: 14.5,
            sector_outlook: "STABLE".to_string(),
            liquidity_score: "HIGH".to_string(),
        },
    }
}

/// Initial context handed to the first stage of a cycle.
///
/// # Errors
/// Returns an error if the fixtures cannot be serialized.
pub fn seed_context(objective: &str) -> Result<Value> {
    let mut context = match serde_json::to_value(perception_bundle())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    context.insert(
        "assets".to_string(),
        serde_json::to_value(fixture_assets())?,
    );
    context.insert("objective".to_string(), Value::String(objective.to_string()));
    Ok(Value::Object(context))
}
