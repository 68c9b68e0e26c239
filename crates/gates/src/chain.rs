//! Gate chain: an ordered list of gates built from descriptors.

use crate::{Gate, GateContext, GateError, Verdict};
use std::collections::HashMap;
use std::sync::Arc;
use taxmate_core::GateKind;
use tracing::debug;

/// The gates available to build chains from, one per kind.
#[derive(Clone, Default)]
pub struct GateSet {
    gates: HashMap<GateKind, Arc<dyn Gate>>,
}

impl GateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gate, replacing any earlier gate of the same kind.
    pub fn with(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gates.insert(gate.kind(), gate);
        self
    }

    /// Build a chain from descriptors.
    ///
    /// Duplicates are dropped and the result is put in the fixed evaluation
    /// order (judgment before approval) whatever order the descriptors came in.
    pub fn chain(&self, kinds: &[GateKind]) -> Result<GateChain, GateError> {
        let mut kinds = kinds.to_vec();
        kinds.sort_by_key(|k| k.rank());
        kinds.dedup();

        let gates = kinds
            .iter()
            .map(|k| {
                self.gates
                    .get(k)
                    .cloned()
                    .ok_or(GateError::Unregistered { kind: k.as_str() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GateChain { gates })
    }
}

/// Gates evaluated in order; the first non-pass verdict wins.
#[derive(Clone, Default)]
pub struct GateChain {
    gates: Vec<Arc<dyn Gate>>,
}

impl GateChain {
    /// A chain with no gates: everything passes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<GateKind> {
        self.gates.iter().map(|g| g.kind()).collect()
    }

    pub async fn evaluate(&self, ctx: &GateContext<'_>) -> Result<Verdict, GateError> {
        for gate in &self.gates {
            let verdict = gate.check(ctx).await?;
            if !verdict.is_pass() {
                return Ok(verdict);
            }
            debug!(thread_id = ctx.thread_id, gate = gate.kind().as_str(), "Gate passed");
        }
        Ok(Verdict::Pass)
    }
}

impl std::fmt::Debug for GateChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateChain")
            .field("gates", &self.kinds())
            .finish()
    }
}
