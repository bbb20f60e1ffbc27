use std::collections::HashSet;

use super::transaction::{Transaction, TxOutput};

/// The set of destination addresses a watcher reports on.
///
/// Addresses are compared exactly as given. Bitcoin bech32 and base58
/// addresses are case sensitive in different ways, so no normalization is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchedAddressSet {
    addresses: HashSet<String>,
}

impl WatchedAddressSet {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = addresses
            .into_iter()
            .map(|addr| addr.as_ref().trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect();

        Self { addresses }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    /// True when at least one output of `tx` pays a watched address
    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.output_addresses().any(|addr| self.contains(addr))
    }

    pub fn watched_outputs<'a>(&self, tx: &'a Transaction) -> Vec<&'a TxOutput> {
        tx.vout
            .iter()
            .filter(|output| output.address().map_or(false, |addr| self.contains(addr)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
