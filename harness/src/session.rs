//! State carried across requests by one engine.

use {
    std::{collections::HashMap, sync::Arc},
    trezoa_keypair::Keypair,
    trezoa_pubkey::Pubkey,
    trezoa_signer::Signer,
};

/// The fee payer plus the name-keyed account caches used while resolving
/// accounts.
///
/// The payer lives as long as the engine. The caches only live for one
/// request: `reset` clears them, so generated accounts never leak from one
/// request into the next.
#[derive(Debug, Default)]
pub struct ExecutionSession {
    payer: Option<Arc<Keypair>>,
    payer_funded: bool,
    addresses: HashMap<String, Pubkey>,
    signers: HashMap<String, Arc<Keypair>>,
}

impl ExecutionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the per-request caches. The payer is kept.
    pub fn reset(&mut self) {
        self.addresses.clear();
        self.signers.clear();
    }

    pub fn payer(&self) -> Option<&Arc<Keypair>> {
        self.payer.as_ref()
    }

    /// The payer, generating one on first use.
    pub fn payer_or_create(&mut self) -> Arc<Keypair> {
        self.payer
            .get_or_insert_with(|| Arc::new(Keypair::new()))
            .clone()
    }

    pub fn is_payer_funded(&self) -> bool {
        self.payer.is_some() && self.payer_funded
    }

    pub fn set_payer_funded(&mut self, funded: bool) {
        self.payer_funded = funded;
    }

    /// A previously resolved address, and its signer if this session
    /// generated it.
    pub fn cached(&self, name: &str) -> Option<(Pubkey, Option<Arc<Keypair>>)> {
        let address = *self.addresses.get(name)?;
        Some((address, self.signers.get(name).cloned()))
    }

    pub fn cache_address(&mut self, name: &str, address: Pubkey) {
        self.addresses.insert(name.to_string(), address);
    }

    /// Generate a keypair for `name`, caching both the address and the
    /// signer.
    pub fn generate(&mut self, name: &str) -> Arc<Keypair> {
        let keypair = Arc::new(Keypair::new());
        self.addresses.insert(name.to_string(), keypair.pubkey());
        self.signers.insert(name.to_string(), Arc::clone(&keypair));
        keypair
    }

    /// Number of cached names.
    pub fn cached_len(&self) -> usize {
        self.addresses.len()
    }
}
