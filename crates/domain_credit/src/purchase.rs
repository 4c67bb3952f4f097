//! Credit purchases
//!
//! Buying credits touches both the cash ledger and the credit inventory. The
//! cash debit goes first; if the lot cannot be created afterwards the debit
//! is compensated with a refund. If that refund fails as well the purchase
//! returns `CompensationFailed` naming the stranded amount.

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use core_kernel::{Cash, UserId};
use domain_ledger::{CashTransaction, CashTransactionType, LedgerError, LedgerService, TransactionRequest};

use crate::error::{CreditError, CreditResult};
use crate::inventory::CreditInventory;
use crate::lot::CreditLot;

/// A sellable credit pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditProduct {
    pub product_id: String,
    pub units: u32,
    pub price: Cash,
}

impl CreditProduct {
    pub fn new(product_id: impl Into<String>, units: u32, price: Cash) -> Self {
        Self {
            product_id: product_id.into(),
            units,
            price,
        }
    }
}

/// Outcome of a completed purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPurchase {
    pub transaction: CashTransaction,
    pub lot: CreditLot,
}

/// Orchestrates cash debit and lot creation
#[derive(Clone)]
pub struct CreditPurchaseService {
    ledger: LedgerService,
    inventory: CreditInventory,
}

impl CreditPurchaseService {
    pub fn new(ledger: LedgerService, inventory: CreditInventory) -> Self {
        Self { ledger, inventory }
    }

    /// Debits the product price and adds a lot of `product.units`
    ///
    /// The idempotency key guards the cash debit: a retried purchase fails
    /// with the ledger's duplicate error and creates no second lot.
    #[instrument(skip(self, product), fields(product_id = %product.product_id))]
    pub async fn purchase(
        &self,
        user_id: UserId,
        product: &CreditProduct,
        idempotency_key: &str,
    ) -> CreditResult<CreditPurchase> {
        if product.units == 0 || product.price <= 0 {
            return Err(CreditError::invalid(format!(
                "product {} must have positive units and price",
                product.product_id
            )));
        }

        let debit = TransactionRequest::new(
            user_id,
            CashTransactionType::Confirm,
            -product.price,
            idempotency_key,
        )
        .with_reference("credit_product", &product.product_id);
        let transaction = self.ledger.record_transaction(debit).await?;

        match self
            .inventory
            .add_lot(user_id, &product.product_id, product.units, transaction.created_at)
            .await
        {
            Ok(lot) => {
                info!(lot_id = %lot.id, transaction_id = %transaction.id, "Credits purchased");
                Ok(CreditPurchase { transaction, lot })
            }
            Err(err) => {
                warn!("Lot creation failed after debit, compensating: {}", err);
                match self.compensate(user_id, product, idempotency_key).await {
                    Ok(()) => Err(err),
                    Err(compensation) => {
                        error!(idempotency_key, "Purchase compensation failed: {}", compensation);
                        Err(CreditError::CompensationFailed {
                            idempotency_key: idempotency_key.to_string(),
                            amount: product.price,
                            original: Box::new(err),
                            compensation,
                        })
                    }
                }
            }
        }
    }

    async fn compensate(
        &self,
        user_id: UserId,
        product: &CreditProduct,
        idempotency_key: &str,
    ) -> Result<(), LedgerError> {
        let reversal = TransactionRequest::new(
            user_id,
            CashTransactionType::Refund,
            product.price,
            format!("{}:reversal", idempotency_key),
        )
        .with_reference("credit_product", &product.product_id);

        self.ledger.record_transaction(reversal).await.map(|_| ())
    }
}
