//! Per-actor boost storage with provenance-scoped removal.

use serde::{Deserialize, Serialize};

use crate::boost::condition::EvaluationContext;
use crate::boost::types::{ActiveBoost, BoostDefinition, BoostType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvenanceError {
    #[error("boost source is empty")]
    EmptySource,
    #[error("boost source id is empty (source '{0}')")]
    EmptySourceId(String),
}

fn check_provenance(source: &str, source_id: &str) -> Result<(), ProvenanceError> {
    if source.trim().is_empty() {
        return Err(ProvenanceError::EmptySource);
    }
    if source_id.trim().is_empty() {
        return Err(ProvenanceError::EmptySourceId(source.to_string()));
    }
    Ok(())
}

/// Ordered boosts owned by one combatant. Iteration follows insertion order.
///
/// Every source that grants boosts is expected to remove them again through
/// [BoostContainer::remove_from] when it expires; the container does not enforce that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoostContainer {
    boosts: Vec<ActiveBoost>,
}

impl BoostContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.boosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveBoost> {
        self.boosts.iter()
    }

    /// Both provenance parts must be non-blank or the boost could never be removed by scope.
    pub fn add(
        &mut self,
        definition: BoostDefinition,
        source: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Result<(), ProvenanceError> {
        self.add_active(ActiveBoost::new(definition, source, source_id))
    }

    pub fn add_active(&mut self, boost: ActiveBoost) -> Result<(), ProvenanceError> {
        check_provenance(&boost.source, &boost.source_id)?;
        self.boosts.push(boost);
        Ok(())
    }

    /// Nothing is added when the provenance is rejected.
    pub fn add_all<I>(
        &mut self,
        definitions: I,
        source: &str,
        source_id: &str,
    ) -> Result<usize, ProvenanceError>
    where
        I: IntoIterator<Item = BoostDefinition>,
    {
        check_provenance(source, source_id)?;
        let before = self.boosts.len();
        self.boosts.extend(
            definitions
                .into_iter()
                .map(|definition| ActiveBoost::new(definition, source, source_id)),
        );
        Ok(self.boosts.len() - before)
    }

    /// Removes every boost granted by `(source, source_id)`. Returns how many were removed.
    pub fn remove_from(&mut self, source: &str, source_id: &str) -> usize {
        let before = self.boosts.len();
        self.boosts.retain(|b| !b.is_from(source, source_id));
        before - self.boosts.len()
    }

    /// Removes every boost whose source category matches, whatever the instance.
    pub fn remove_by_source_category(&mut self, source: &str) -> usize {
        let before = self.boosts.len();
        self.boosts
            .retain(|b| !b.source.eq_ignore_ascii_case(source));
        before - self.boosts.len()
    }

    pub fn remove_all(&mut self) -> usize {
        let count = self.boosts.len();
        self.boosts.clear();
        count
    }

    /// Unconditional boosts of a type. Conditional boosts need a context, see
    /// [BoostContainer::query_with_context].
    pub fn get_by_type(&self, boost_type: BoostType) -> Vec<&ActiveBoost> {
        self.boosts
            .iter()
            .filter(|b| b.boost_type() == boost_type && !b.definition.is_conditional())
            .collect()
    }

    /// Unconditional boosts of a type that also satisfy `predicate`.
    pub fn get_by_type_where<F>(&self, boost_type: BoostType, predicate: F) -> Vec<&ActiveBoost>
    where
        F: Fn(&ActiveBoost) -> bool,
    {
        self.get_by_type(boost_type)
            .into_iter()
            .filter(|b| predicate(b))
            .collect()
    }

    /// Boosts granted by a source category, optionally narrowed to one instance.
    pub fn get_from_source(&self, source: &str, source_id: Option<&str>) -> Vec<&ActiveBoost> {
        self.boosts
            .iter()
            .filter(|b| match source_id {
                Some(id) => b.is_from(source, id),
                None => b.source.eq_ignore_ascii_case(source),
            })
            .collect()
    }

    /// True if any unconditional boost of the type is present.
    pub fn has(&self, boost_type: BoostType) -> bool {
        self.boosts
            .iter()
            .any(|b| b.boost_type() == boost_type && !b.definition.is_conditional())
    }

    /// Boosts of a type, including conditional ones whose condition holds in `context`.
    pub fn query_with_context(
        &self,
        boost_type: BoostType,
        context: &EvaluationContext<'_>,
    ) -> Vec<&ActiveBoost> {
        self.boosts
            .iter()
            .filter(|b| b.boost_type() == boost_type)
            .filter(|b| match b.definition.condition.as_deref() {
                Some(condition) if !condition.trim().is_empty() => context.holds(condition),
                _ => true,
            })
            .collect()
    }

    /// Dispatches to [BoostContainer::query_with_context] or [BoostContainer::get_by_type].
    pub fn query(
        &self,
        boost_type: BoostType,
        context: Option<&EvaluationContext<'_>>,
    ) -> Vec<&ActiveBoost> {
        match context {
            Some(ctx) => self.query_with_context(boost_type, ctx),
            None => self.get_by_type(boost_type),
        }
    }
}
