//! Cache key derivation.
//!
//! The digested tail of a key covers the call arguments, the state of the
//! criteria chain and the ambient request. Chain state lists every criterion
//! in order with its kind, so reordering or swapping a criterion changes the
//! key even when the resulting query would be the same.

use std::sync::Arc;

use repocache_core::context::fingerprint_component;
use repocache_core::{Error, KeyRegistry, RequestContext, fingerprint};
use serde_json::{Value, json};

use crate::criteria::{CriteriaChain, Criterion, CriterionState};

/// Derives cache keys and records each one in the key registry.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    registry: Arc<KeyRegistry>,
}

impl KeyDeriver {
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// Derive the key of a call and register it under `identity`.
    ///
    /// A key is never returned unregistered: if the registry write fails the
    /// error is returned instead of the key.
    ///
    /// # Errors
    ///
    /// `Error::Serialization` when the arguments or a criterion have no
    /// stable description; registry errors otherwise.
    pub async fn derive(
        &self, identity: &str, method: &str, args: &Value, chain: &CriteriaChain, request: Option<&RequestContext>,
    ) -> Result<String, Error> {
        let key = fingerprint_call(identity, method, args, chain, request)?;
        self.registry.put_key(identity, &key).await?;
        Ok(key)
    }
}

/// The key of a call, without registering it.
pub fn fingerprint_call(
    identity: &str, method: &str, args: &Value, chain: &CriteriaChain, request: Option<&RequestContext>,
) -> Result<String, Error> {
    let args = serde_json::to_string(args).map_err(|e| Error::Serialization(e.to_string()))?;
    let chain = serde_json::to_string(&chain_state(chain)?).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(fingerprint::cache_key(identity, method, &[&args, &chain, fingerprint_component(request)]))
}

/// Stable description of a chain: its skip flag and every criterion in order.
pub fn chain_state(chain: &CriteriaChain) -> Result<Value, Error> {
    let criteria = chain.iter().map(criterion_state).collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "skip": chain.is_skipped(), "criteria": criteria }))
}

/// Stable description of one criterion.
///
/// Serializable criteria contribute their configuration. Structural criteria
/// contribute a digest of their kind and declared properties.
pub fn criterion_state(criterion: &dyn Criterion) -> Result<Value, Error> {
    let kind = criterion.kind();
    match criterion.state() {
        CriterionState::Serialized(state) => Ok(json!({ "kind": kind.name(), "state": state })),
        CriterionState::Structural(properties) => {
            let properties =
                serde_json::to_string(&properties).map_err(|e| Error::Serialization(e.to_string()))?;
            Ok(json!({ "kind": kind.name(), "structural": fingerprint::digest(&[kind.name(), &properties]) }))
        }
        CriterionState::Opaque => {
            Err(Error::Serialization(format!("criterion {kind} has no stable state to fingerprint")))
        }
    }
}
