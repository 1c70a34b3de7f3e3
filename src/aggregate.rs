use std::sync::Arc;

use polars::prelude::{
    Expr, JoinArgs, JoinType, LazyFrame, MaintainOrderJoin, PlSmallStr, Selector, col,
};

use crate::{error::FeatureResult, polars_ext::polars_to_feature_error};

/// Group, summarize, and left-join a per-key summary back onto its base table.
///
/// Every aggregation-based feature goes through this type so that the base table keeps
/// exactly its rows and order: keys without a summary row (or with a null key) receive
/// nulls, and summaries are unique per key because they come from a `group_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupJoin {
    keys: Vec<PlSmallStr>,
}

impl GroupJoin {
    pub fn on<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PlSmallStr>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keys(&self) -> &[PlSmallStr] {
        &self.keys
    }

    /// One row per key with the given aggregations.
    pub fn summarize(&self, base: &LazyFrame, aggs: Vec<Expr>) -> LazyFrame {
        base.clone().group_by(self.key_exprs()).agg(aggs)
    }

    /// Summarizes `base` and joins the result back onto it.
    pub fn aggregate(&self, base: LazyFrame, aggs: Vec<Expr>) -> FeatureResult<LazyFrame> {
        let summary = self.summarize(&base, aggs);
        self.attach(base, summary)
    }

    /// Left-joins a summary keyed on `self.keys()` onto `base`.
    ///
    /// The summary must hold at most one row per key. Base columns that the summary
    /// recomputes are replaced rather than suffixed.
    pub fn attach(&self, mut base: LazyFrame, mut summary: LazyFrame) -> FeatureResult<LazyFrame> {
        let base_schema = base
            .collect_schema()
            .map_err(|e| polars_to_feature_error("group join (base schema)", e))?;
        let summary_schema = summary
            .collect_schema()
            .map_err(|e| polars_to_feature_error("group join (summary schema)", e))?;

        let replaced = summary_schema
            .iter_names()
            .filter(|n| !self.keys.contains(n) && base_schema.contains(n.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        if !replaced.is_empty() {
            tracing::debug!(columns = ?replaced, "Replacing base columns with joined summary");
            base = base.drop(Selector::ByName {
                names: Arc::from(replaced),
                strict: false,
            });
        }

        Ok(base.join(
            summary,
            self.key_exprs(),
            self.key_exprs(),
            JoinArgs {
                how: JoinType::Left,
                maintain_order: MaintainOrderJoin::Left,
                ..Default::default()
            },
        ))
    }

    fn key_exprs(&self) -> Vec<Expr> {
        self.keys.iter().map(|k| col(k.clone())).collect()
    }
}
