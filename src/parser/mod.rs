//! Transaction parser
//!
//! Maps one enhanced-transaction payload to zero or more canonical
//! `TransferEvent`s for the configured target mint. Direction comes from the
//! fee payer's side of the transfer: recipient ⇒ buy, sender ⇒ sell.

use log::debug;

use crate::types::{short, EnhancedTransaction, TradeDirection, TransferEvent};

pub struct TransferParser {
    target_mint: String,
}

impl TransferParser {
    pub fn new(target_mint: String) -> Self {
        Self { target_mint }
    }

    /// Parse a payload into canonical events.
    ///
    /// Scans `tokenTransfers` for the first entry matching the target mint and
    /// emits at most one event. Transfers where the fee payer is neither side
    /// produce nothing (routed swaps through intermediate accounts).
    pub fn parse(&self, tx: &EnhancedTransaction) -> Vec<TransferEvent> {
        let transfer = match tx
            .token_transfers
            .iter()
            .find(|t| t.mint == self.target_mint)
        {
            Some(t) => t,
            None => return Vec::new(),
        };

        let (direction, wallet) = if transfer.to_user_account == tx.fee_payer {
            (TradeDirection::Buy, transfer.to_user_account.clone())
        } else if transfer.from_user_account == tx.fee_payer {
            (TradeDirection::Sell, transfer.from_user_account.clone())
        } else {
            debug!(
                "⏭️  {}: fee payer {} not a party to the target-mint transfer",
                short(&tx.signature),
                short(&tx.fee_payer)
            );
            return Vec::new();
        };

        // Raw amount and decimals come from the raw record when the provider
        // includes it; otherwise the ui amount is taken as-is with decimals 0.
        let (amount, decimals) = match &transfer.raw_token_amount {
            Some(raw) => (raw.token_amount.parse::<u64>().unwrap_or(0), raw.decimals),
            None => (transfer.token_amount as u64, 0),
        };

        debug!(
            "📥 {} {} {} of {} by {}",
            short(&tx.signature),
            direction.as_str(),
            amount,
            short(&transfer.mint),
            short(&wallet)
        );

        vec![TransferEvent {
            wallet,
            mint: transfer.mint.clone(),
            amount,
            decimals,
            signature: tx.signature.clone(),
            timestamp: tx.timestamp,
            direction,
            usd_value: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawTokenAmount, TokenTransfer};

    fn tx(fee_payer: &str, transfers: Vec<TokenTransfer>) -> EnhancedTransaction {
        EnhancedTransaction {
            signature: "s1".to_string(),
            timestamp: 1_700_000_000,
            fee_payer: fee_payer.to_string(),
            token_transfers: transfers,
        }
    }

    fn transfer(from: &str, to: &str, mint: &str, amount: f64) -> TokenTransfer {
        TokenTransfer {
            from_user_account: from.to_string(),
            to_user_account: to.to_string(),
            mint: mint.to_string(),
            token_amount: amount,
            raw_token_amount: None,
        }
    }

    #[test]
    fn test_buy_detection() {
        let parser = TransferParser::new("M".to_string());
        let events = parser.parse(&tx("W1", vec![transfer("X", "W1", "M", 1000.0)]));

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.wallet, "W1");
        assert_eq!(e.direction, TradeDirection::Buy);
        assert_eq!(e.amount, 1000);
        assert_eq!(e.decimals, 0);
        assert_eq!(e.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_sell_detection() {
        let parser = TransferParser::new("M".to_string());
        let events = parser.parse(&tx("W1", vec![transfer("W1", "Y", "M", 500.0)]));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, TradeDirection::Sell);
        assert_eq!(events[0].wallet, "W1");
    }

    #[test]
    fn test_no_target_mint() {
        let parser = TransferParser::new("M".to_string());
        let events = parser.parse(&tx("W1", vec![transfer("X", "W1", "OTHER", 1000.0)]));
        assert!(events.is_empty());
    }

    #[test]
    fn test_fee_payer_not_involved() {
        let parser = TransferParser::new("M".to_string());
        let events = parser.parse(&tx("W1", vec![transfer("X", "Y", "M", 1000.0)]));
        assert!(events.is_empty());
    }

    #[test]
    fn test_first_matching_transfer_wins() {
        let parser = TransferParser::new("M".to_string());
        let events = parser.parse(&tx(
            "W1",
            vec![
                transfer("X", "Y", "OTHER", 1.0),
                transfer("X", "W1", "M", 42.0),
                transfer("W1", "Z", "M", 99.0),
            ],
        ));

        // Only the first target-mint transfer is considered
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, TradeDirection::Buy);
        assert_eq!(events[0].amount, 42);
    }

    #[test]
    fn test_decimals_carried_from_raw_record() {
        let parser = TransferParser::new("M".to_string());
        let mut t = transfer("X", "W1", "M", 1.5);
        t.raw_token_amount = Some(RawTokenAmount {
            token_amount: "1500000000".to_string(),
            decimals: 9,
        });
        let events = parser.parse(&tx("W1", vec![t]));

        assert_eq!(events[0].amount, 1_500_000_000);
        assert_eq!(events[0].decimals, 9);
        assert!((events[0].ui_amount() - 1.5).abs() < 1e-9);
    }
}
