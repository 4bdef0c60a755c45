//! Period Pairing Engine
//!
//! Pairs every pre-aggregated row with the row of the same grouping key in
//! the following period. Keys present on only one side are kept with nulls
//! on the other, tagged `introduced` / `discontinued`, and attributed to the
//! shallowest hierarchy prefix at which the key stops matching.
//!
//! The full outer join is expressed as an entity universe (distinct keys of
//! both sides) left-joined to each side, so every join is a hash join.

use crate::core::engine::compiler::{
    next_column, CompiledExpressions, DISCONTINUED, INTRODUCED, LIKE_FOR_LIKE, STATUS,
    STATUS_REASON,
};
use crate::error::Result;
use crate::periods::PeriodIndex;
use polars::prelude::*;
use tracing::debug;

const PRESENT: &str = "__pvm_present";

pub struct PeriodPairing<'a> {
    periods: &'a PeriodIndex,
    compiled: &'a CompiledExpressions,
}

impl<'a> PeriodPairing<'a> {
    pub fn new(periods: &'a PeriodIndex, compiled: &'a CompiledExpressions) -> Self {
        Self { periods, compiled }
    }

    /// Pair consecutive periods of `aggregated` on `hierarchy`.
    ///
    /// Output columns: period, hierarchy, measures, `<measure>_next`,
    /// `status`, `status_reason`.
    pub fn pair(&self, aggregated: LazyFrame, hierarchy: &[String]) -> Result<LazyFrame> {
        let period = self.periods.column();
        let period_next = self.periods.next_column();
        let measures = self.compiled.measure_columns();
        let next_map = self.periods.next_map()?.lazy();

        let keys = key_exprs(period, hierarchy);

        // Every period but the last, annotated with its successor
        let current = aggregated
            .clone()
            .join(
                next_map.clone(),
                [col(period)],
                [col(period)],
                join_args(JoinType::Left),
            )
            .filter(col(&period_next).is_not_null());

        // Every period but the first, measures renamed to `_next` and
        // annotated with the base period they pair with
        let mut following_select = vec![col(period).alias(&period_next)];
        following_select.extend(hierarchy.iter().map(|h| col(h)));
        following_select.extend(measures.iter().map(|m| col(m).alias(&next_column(m))));
        let following = aggregated
            .select(following_select)
            .join(
                next_map,
                [col(&period_next)],
                [col(&period_next)],
                join_args(JoinType::Left),
            )
            .filter(col(period).is_not_null());

        let mut universe_cols = vec![col(period), col(&period_next)];
        universe_cols.extend(hierarchy.iter().map(|h| col(h)));
        let universe = concat(
            [
                current.clone().select(universe_cols.clone()),
                following.clone().select(universe_cols),
            ],
            UnionArgs::default(),
        )?
        .unique_stable(None, UniqueKeepStrategy::First);

        let mut current_cols = keys.clone();
        current_cols.extend(measures.iter().map(|m| col(m)));
        let mut following_cols = keys.clone();
        following_cols.extend(measures.iter().map(|m| col(&next_column(m))));

        let status_column = self.compiled.status_column();
        let mut paired = universe
            .join(
                current.clone().select(current_cols),
                keys.clone(),
                keys.clone(),
                join_args(JoinType::Left),
            )
            .join(
                following.clone().select(following_cols),
                keys.clone(),
                keys.clone(),
                join_args(JoinType::Left),
            )
            .with_columns([
                when(col(status_column).is_null())
                    .then(lit(INTRODUCED))
                    .when(col(&next_column(status_column)).is_null())
                    .then(lit(DISCONTINUED))
                    .otherwise(lit(LIKE_FOR_LIKE))
                    .alias(STATUS),
                lit("").alias(STATUS_REASON),
            ]);

        // Shortest prefix first; a reason, once recorded, is never replaced
        for depth in 1..=hierarchy.len() {
            let prefix = &hierarchy[..depth];
            let prefix_keys = key_exprs(period, prefix);
            let reason = prefix.join(",");
            let marker = format!("__pvm_unmatched_{}", depth);

            let current_prefixes = current
                .clone()
                .select(prefix_keys.clone())
                .unique_stable(None, UniqueKeepStrategy::First);
            let following_prefixes = following
                .clone()
                .select(prefix_keys.clone())
                .unique_stable(None, UniqueKeepStrategy::First);

            let discontinued = anti_join(
                current_prefixes.clone(),
                following_prefixes.clone(),
                &prefix_keys,
            );
            let introduced = anti_join(following_prefixes, current_prefixes, &prefix_keys);

            let unmatched = concat([discontinued, introduced], UnionArgs::default())?
                .unique_stable(None, UniqueKeepStrategy::First)
                .with_column(lit(true).alias(&marker));

            debug!("Attributing unmatched keys at prefix '{}'", reason);

            paired = paired
                .join(
                    unmatched,
                    prefix_keys.clone(),
                    prefix_keys,
                    join_args(JoinType::Left),
                )
                .with_column(
                    when(
                        col(&marker)
                            .is_not_null()
                            .and(col(STATUS_REASON).eq(lit(""))),
                    )
                    .then(lit(reason))
                    .otherwise(col(STATUS_REASON))
                    .alias(STATUS_REASON),
                );
        }

        let mut output = keys;
        output.extend(measures.iter().map(|m| col(m)));
        output.extend(measures.iter().map(|m| col(&next_column(m))));
        output.push(col(STATUS));
        output.push(col(STATUS_REASON));

        Ok(paired.select(output))
    }
}

fn key_exprs(period: &str, hierarchy: &[String]) -> Vec<Expr> {
    let mut keys = vec![col(period)];
    keys.extend(hierarchy.iter().map(|h| col(h)));
    keys
}

/// Order-preserving hash joins where null keys match each other
fn join_args(how: JoinType) -> JoinArgs {
    JoinArgs {
        join_nulls: true,
        ..JoinArgs::new(how)
    }
}

/// Rows of `left` whose `keys` do not appear in `right`
fn anti_join(left: LazyFrame, right: LazyFrame, keys: &[Expr]) -> LazyFrame {
    left.join(
        right.with_column(lit(true).alias(PRESENT)),
        keys.to_vec(),
        keys.to_vec(),
        join_args(JoinType::Left),
    )
    .filter(col(PRESENT).is_null())
    .select(keys.to_vec())
}
