use serde::{Deserialize, Serialize};

const SATOSHIS_PER_BTC: f64 = 100_000_000.0;

/// A bounded slice `[start_index, end_index)` of one block's transaction list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionPage {
    pub block_id: String,
    pub block_height: u64,
    pub start_index: usize,
    pub end_index: usize,
}

impl TransactionPage {
    /// Number of transactions the page covers
    pub fn width(&self) -> usize {
        self.end_index - self.start_index
    }

    /// Split a block's `tx_count` transactions into pages of at most `page_size`.
    /// The last page is truncated at `tx_count`, never padded past it.
    pub fn plan(block_id: &str, block_height: u64, tx_count: usize, page_size: usize) -> Vec<TransactionPage> {
        let page_size = page_size.max(1);

        (0..tx_count)
            .step_by(page_size)
            .map(|start_index| TransactionPage {
                block_id: block_id.to_string(),
                block_height,
                start_index,
                end_index: (start_index + page_size).min(tx_count),
            })
            .collect()
    }
}

/// Transaction record as served by the explorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub locktime: u32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub weight: u64,
    /// Fee in satoshis
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
    #[serde(default)]
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    pub txid: String,
    pub vout: u32,
    /// Missing for coinbase inputs
    #[serde(default)]
    pub prevout: Option<Prevout>,
    #[serde(default)]
    pub is_coinbase: bool,
    #[serde(default)]
    pub sequence: u32,
}

/// The output an input spends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prevout {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    pub scriptpubkey: String,
    #[serde(default)]
    pub scriptpubkey_asm: String,
    #[serde(default)]
    pub scriptpubkey_type: String,
    /// Missing for OP_RETURN and other non-standard scripts
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    /// Value in satoshis
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_time: Option<u64>,
}

impl TxOutput {
    pub fn address(&self) -> Option<&str> {
        self.scriptpubkey_address.as_deref()
    }

    pub fn value_btc(&self) -> f64 {
        self.value as f64 / SATOSHIS_PER_BTC
    }
}

impl Prevout {
    pub fn value_btc(&self) -> f64 {
        self.value as f64 / SATOSHIS_PER_BTC
    }
}

impl Transaction {
    /// Destination addresses of every output that has one
    pub fn output_addresses(&self) -> impl Iterator<Item = &str> {
        self.vout.iter().filter_map(TxOutput::address)
    }

    pub fn total_output_value(&self) -> u64 {
        self.vout.iter().map(|output| output.value).sum()
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.iter().any(|input| input.is_coinbase)
    }
}
