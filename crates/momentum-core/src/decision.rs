use std::collections::BTreeSet;

use serde::Serialize;

use crate::ranking::Selection;
use crate::{Holding, Portfolio, Symbol};

/// Buy/sell/hold sets for one rebalance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub buy: BTreeSet<Symbol>,
    pub sell: BTreeSet<Symbol>,
    pub hold: BTreeSet<Symbol>,
}

impl Decision {
    /// Symbols held after the rebalance.
    pub fn target_holdings(&self) -> BTreeSet<Symbol> {
        self.hold.union(&self.buy).cloned().collect()
    }

    pub fn is_noop(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}

/// `sell = current - top40`, `buy = top20 - current`, `hold = current ∩ top40`.
pub fn decide(
    current: &BTreeSet<Symbol>,
    top40: &BTreeSet<Symbol>,
    top20: &BTreeSet<Symbol>,
) -> Decision {
    Decision {
        buy: top20.difference(current).cloned().collect(),
        sell: current.difference(top40).cloned().collect(),
        hold: current.intersection(top40).cloned().collect(),
    }
}

pub fn decide_for(portfolio: &Portfolio, selection: &Selection) -> Decision {
    decide(&portfolio.symbols(), &selection.top40, &selection.top20)
}

impl Portfolio {
    /// Apply a decision: held positions keep their units, buys enter as
    /// paper positions, sells are dropped.
    pub fn rebalanced(&self, decision: &Decision) -> Portfolio {
        decision
            .target_holdings()
            .into_iter()
            .map(|symbol| {
                self.get(&symbol)
                    .cloned()
                    .unwrap_or_else(|| Holding::paper(symbol))
            })
            .collect()
    }
}
