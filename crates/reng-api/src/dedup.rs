//! Deduplication of listed recommendations by signature (spec §6): two
//! rows created within the same 5-second bucket, for the same symbol and
//! direction, with entry/take-profit/stop-loss equal to two decimals, are
//! the same underlying signal surfaced twice. Among duplicates, the
//! newest wins; ties break on higher confidence.

use reng_types::{Direction, Recommendation};
use rust_decimal::prelude::ToPrimitive;

const TIME_BUCKET_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Signature {
    time_bucket: i64,
    symbol: String,
    direction: Direction,
    entry: i64,
    take_profit: i64,
    stop_loss: i64,
}

fn round2_key(price: rust_decimal::Decimal) -> i64 {
    (price.to_f64().unwrap_or(0.0) * 100.0).round() as i64
}

fn signature(rec: &Recommendation) -> Signature {
    Signature {
        time_bucket: rec.created_at.timestamp() / TIME_BUCKET_SECS,
        symbol: rec.symbol.clone(),
        direction: rec.direction,
        entry: round2_key(rec.entry_price),
        take_profit: round2_key(rec.take_profit_price),
        stop_loss: round2_key(rec.stop_loss_price),
    }
}

/// Collapse duplicate signals, keeping the newest (or, on an exact tie,
/// the highest-confidence) representative per signature. Preserves the
/// relative order of the surviving representatives as they first appear.
pub fn dedup_by_signature(recs: Vec<Recommendation>) -> Vec<Recommendation> {
    use std::collections::HashMap;

    let mut order: Vec<Signature> = Vec::new();
    let mut winners: HashMap<Signature, Recommendation> = HashMap::new();

    for rec in recs {
        let sig = signature(&rec);
        match winners.get(&sig) {
            None => {
                order.push(sig.clone());
                winners.insert(sig, rec);
            }
            Some(existing) => {
                let replace = match rec.created_at.cmp(&existing.created_at) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Equal => rec.confidence > existing.confidence,
                    std::cmp::Ordering::Less => false,
                };
                if replace {
                    winners.insert(sig, rec);
                }
            }
        }
    }

    order.into_iter().filter_map(|sig| winners.remove(&sig)).collect()
}
