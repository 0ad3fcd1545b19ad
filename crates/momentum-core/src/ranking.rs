use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::Date;
use tracing::warn;

use crate::{ReturnRecord, Symbol, ValidationError};

/// Number of top-ranked symbols bought into the portfolio.
pub const BUY_RANK: usize = 20;
/// Holdings ranked below this are sold.
pub const KEEP_RANK: usize = 40;

/// Return records ordered best first; ties resolved by symbol ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RankedList {
    records: Vec<ReturnRecord>,
}

impl RankedList {
    pub fn records(&self) -> &[ReturnRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.records.iter().map(|record| &record.symbol)
    }

    /// 1-based rank of `symbol`, if ranked.
    pub fn position(&self, symbol: &Symbol) -> Option<usize> {
        self.records
            .iter()
            .position(|record| &record.symbol == symbol)
            .map(|index| index + 1)
    }
}

fn by_momentum(a: &ReturnRecord, b: &ReturnRecord) -> Ordering {
    b.return_pct
        .total_cmp(&a.return_pct)
        .then_with(|| a.symbol.cmp(&b.symbol))
}

/// Sort records by `return_pct` descending, then symbol ascending.
pub fn rank(records: impl IntoIterator<Item = ReturnRecord>) -> RankedList {
    let mut records: Vec<ReturnRecord> = records.into_iter().collect();
    records.sort_by(by_momentum);
    RankedList { records }
}

/// Rank a `symbol -> return_pct` map computed for `as_of`.
pub fn rank_returns(
    returns: &BTreeMap<Symbol, f64>,
    as_of: Date,
) -> Result<RankedList, ValidationError> {
    let records = returns
        .iter()
        .map(|(symbol, pct)| ReturnRecord::new(symbol.clone(), *pct, as_of))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rank(records))
}

/// The first `n` symbols; the whole list when `n` exceeds its length.
pub fn top_n(ranked: &RankedList, n: usize) -> Vec<Symbol> {
    ranked.symbols().take(n).cloned().collect()
}

/// Buy and keep sets derived from one ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub top20: BTreeSet<Symbol>,
    pub top40: BTreeSet<Symbol>,
    /// Fewer ranked symbols than the keep threshold.
    pub degraded: bool,
}

impl Selection {
    pub fn from_ranked(ranked: &RankedList, buy_n: usize, keep_n: usize) -> Self {
        let keep_n = keep_n.max(buy_n);
        let degraded = ranked.len() < keep_n;
        if degraded {
            warn!(
                ranked = ranked.len(),
                expected = keep_n,
                "ranked universe is smaller than the keep threshold"
            );
        }

        Self {
            top20: top_n(ranked, buy_n).into_iter().collect(),
            top40: top_n(ranked, keep_n).into_iter().collect(),
            degraded,
        }
    }

    pub fn standard(ranked: &RankedList) -> Self {
        Self::from_ranked(ranked, BUY_RANK, KEEP_RANK)
    }
}
