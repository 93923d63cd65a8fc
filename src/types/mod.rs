use serde::{Deserialize, Serialize};

/// One enhanced-transaction notification pushed by the upstream provider.
///
/// Only the fields the pipeline consumes are modeled; everything else in the
/// payload is ignored by serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedTransaction {
    pub signature: String,
    /// Unix seconds.
    pub timestamp: u64,
    #[serde(rename = "feePayer", default)]
    pub fee_payer: String,
    #[serde(rename = "tokenTransfers", default)]
    pub token_transfers: Vec<TokenTransfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransfer {
    #[serde(rename = "fromUserAccount", default)]
    pub from_user_account: String,
    #[serde(rename = "toUserAccount", default)]
    pub to_user_account: String,
    #[serde(default)]
    pub mint: String,
    /// UI amount as the provider reports it (already decimal-adjusted).
    #[serde(rename = "tokenAmount", default)]
    pub token_amount: f64,
    /// Raw on-chain amount + decimals, when the provider includes it.
    #[serde(rename = "rawTokenAmount")]
    pub raw_token_amount: Option<RawTokenAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTokenAmount {
    /// Stringified unsigned integer.
    #[serde(rename = "tokenAmount")]
    pub token_amount: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "🟢",
            TradeDirection::Sell => "🔴",
        }
    }
}

/// Canonical buy/sell event, immutable once constructed.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub wallet: String,
    pub mint: String,
    /// Raw token amount (10^decimals units per whole token).
    pub amount: u64,
    pub decimals: u8,
    pub signature: String,
    /// Unix seconds.
    pub timestamp: u64,
    pub direction: TradeDirection,
    /// Resolved by the price oracle; None when the quote provider failed.
    pub usd_value: Option<f64>,
}

impl TransferEvent {
    /// Decimal-adjusted token amount for display.
    pub fn ui_amount(&self) -> f64 {
        self.amount as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// Shorten an address or signature for log lines and chat messages.
pub fn short(s: &str) -> String {
    if s.len() <= 12 {
        s.to_string()
    } else {
        format!("{}..{}", &s[..6], &s[s.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enhanced_transaction() {
        let raw = r#"{
            "signature": "s1",
            "timestamp": 1700000000,
            "feePayer": "W1",
            "type": "TRANSFER",
            "tokenTransfers": [
                {"fromUserAccount": "X", "toUserAccount": "W1", "mint": "M", "tokenAmount": 1000.0}
            ]
        }"#;
        let tx: EnhancedTransaction = serde_json::from_str(raw).unwrap();
        assert_eq!(tx.signature, "s1");
        assert_eq!(tx.fee_payer, "W1");
        assert_eq!(tx.token_transfers.len(), 1);
        assert!(tx.token_transfers[0].raw_token_amount.is_none());
    }

    #[test]
    fn test_parse_raw_token_amount() {
        let raw = r#"{
            "signature": "s2",
            "timestamp": 1700000001,
            "feePayer": "W1",
            "tokenTransfers": [
                {"fromUserAccount": "W1", "toUserAccount": "Y", "mint": "M",
                 "tokenAmount": 1.5,
                 "rawTokenAmount": {"tokenAmount": "1500000000", "decimals": 9}}
            ]
        }"#;
        let tx: EnhancedTransaction = serde_json::from_str(raw).unwrap();
        let rta = tx.token_transfers[0].raw_token_amount.as_ref().unwrap();
        assert_eq!(rta.token_amount, "1500000000");
        assert_eq!(rta.decimals, 9);
    }

    #[test]
    fn test_ui_amount() {
        let event = TransferEvent {
            wallet: "W1".to_string(),
            mint: "M".to_string(),
            amount: 1_500_000_000,
            decimals: 9,
            signature: "s".to_string(),
            timestamp: 0,
            direction: TradeDirection::Buy,
            usd_value: None,
        };
        assert!((event.ui_amount() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_short_display() {
        assert_eq!(short("abcdef"), "abcdef");
        assert_eq!(short("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU"), "7xKXtg..gAsU");
    }
}
