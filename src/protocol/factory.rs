/*!
Agreement construction.

The factory validates a specification, mints a session identifier for
the flows that carry one, and returns the matching state machine behind
the [`Agreement`] trait.
*/

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::core::error::Result;
use crate::core::registry;
use crate::core::spec::{AgreementKind, AgreementSpec, KeyPairSpec};
use crate::protocol::agreement::{
    Agreement, BasicAgreement, CompositeAgreement, EphemeralAgreement, OneMessageAgreement,
    SignedAgreement,
};

/// Factory minting configured agreements and unique session identifiers
#[derive(Debug, Default)]
pub struct AgreementFactory {
    next_id: AtomicU64,
}

impl AgreementFactory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Mint the next session identifier
    pub fn next_session_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Every structurally valid specification for the given key-pair
    /// family
    pub fn list_possible_agreements(&self, key_pair: &KeyPairSpec) -> Vec<AgreementSpec> {
        registry::agreements_for(key_pair)
    }

    /// Build the state machine for a validated specification
    pub fn create_agreement(&self, spec: &AgreementSpec) -> Result<Box<dyn Agreement>> {
        debug!(spec = %spec, "creating agreement");

        if spec.key_pair().is_composite() {
            let session_id = if spec.kind().is_one_message() {
                None
            } else {
                Some(self.next_session_id())
            };
            return Ok(Box::new(CompositeAgreement::new(spec.clone(), session_id)));
        }

        Ok(match spec.kind() {
            AgreementKind::Kem | AgreementKind::Anonymous => {
                Box::new(OneMessageAgreement::new(spec.clone()))
            }
            AgreementKind::Basic => {
                Box::new(BasicAgreement::new(spec.clone(), self.next_session_id()))
            }
            AgreementKind::Ephemeral(variant) => Box::new(EphemeralAgreement::new(
                spec.clone(),
                variant,
                self.next_session_id(),
            )),
            AgreementKind::Signed(variant) => Box::new(SignedAgreement::new(
                spec.clone(),
                variant,
                self.next_session_id(),
            )),
        })
    }
}
