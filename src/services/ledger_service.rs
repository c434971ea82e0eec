//! Ledger service - balance-affecting operations on accounts.
//!
//! Every mutation here maps to exactly one atomic store call. The service
//! validates input first so the store never sees a non-positive amount, an
//! amount with sub-cent precision, or one too large for a money column.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{validate_amount, validate_money};
use crate::{
    error::AppError,
    models::{
        account::{Account, CreateAccountRequest, UpdateBalanceRequest},
        operation::{HistoryQuery, Operation},
        reservation::{NewReservation, Reservation, ReservationRef},
    },
    repository::LedgerStore,
};

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Open an account for a user.
    ///
    /// # Errors
    ///
    /// - `Validation`: negative `free`, non-zero `reserved`, or the user
    ///   already has an account
    pub async fn create_account(&self, request: CreateAccountRequest) -> Result<Account, AppError> {
        if request.free < Decimal::ZERO {
            return Err(AppError::Validation("free must not be negative".to_string()));
        }
        validate_money(request.free)?;
        if !request.reserved.is_zero() {
            return Err(AppError::Validation(
                "reserved funds can only come from reservations".to_string(),
            ));
        }

        let account = self
            .store
            .create_account(request.user_id, request.free)
            .await?;

        tracing::info!(account_id = %account.id, user_id = %account.user_id, free = %account.free, "account created");
        Ok(account)
    }

    pub async fn account_by_user_id(&self, user_id: Uuid) -> Result<Account, AppError> {
        self.store
            .account_by_user_id(user_id)
            .await?
            .ok_or(AppError::NotFound("account"))
    }

    pub async fn account_by_id(&self, account_id: Uuid) -> Result<Account, AppError> {
        self.store
            .account_by_id(account_id)
            .await?
            .ok_or(AppError::NotFound("account"))
    }

    /// Set `free` to an absolute value. `reserved` is read-only here.
    pub async fn adjust_balance(
        &self,
        account_id: Uuid,
        request: UpdateBalanceRequest,
    ) -> Result<Account, AppError> {
        if request.free < Decimal::ZERO {
            return Err(AppError::Validation("free must not be negative".to_string()));
        }
        validate_money(request.free)?;

        if let Some(reserved) = request.reserved {
            let current = self.account_by_id(account_id).await?;
            if reserved != current.reserved {
                return Err(AppError::Validation(
                    "reserved funds can only change through reservations".to_string(),
                ));
            }
        }

        let account = self.store.set_free_balance(account_id, request.free).await?;

        tracing::info!(account_id = %account_id, free = %account.free, "balance adjusted");
        Ok(account)
    }

    pub async fn deposit(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError> {
        validate_amount(amount)?;

        let account = self.store.deposit(account_id, amount).await?;

        tracing::info!(account_id = %account_id, amount = %amount, "deposit applied");
        Ok(account)
    }

    pub async fn withdraw(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError> {
        validate_amount(amount)?;

        let account = self.store.withdraw(account_id, amount).await?;

        tracing::info!(account_id = %account_id, amount = %amount, "withdrawal applied");
        Ok(account)
    }

    /// Move `amount` of free funds between two distinct accounts.
    pub async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
    ) -> Result<(Account, Account), AppError> {
        validate_amount(amount)?;
        if from_account_id == to_account_id {
            return Err(AppError::Validation(
                "cannot transfer to the same account".to_string(),
            ));
        }

        let accounts = self
            .store
            .transfer(from_account_id, to_account_id, amount)
            .await?;

        tracing::info!(
            from = %from_account_id,
            to = %to_account_id,
            amount = %amount,
            "transfer applied"
        );
        Ok(accounts)
    }

    pub async fn reserve(&self, reservation: NewReservation) -> Result<Reservation, AppError> {
        validate_amount(reservation.amount)?;

        let reservation = self.store.reserve(reservation).await?;

        tracing::info!(
            account_id = %reservation.account_id,
            order_id = %reservation.order_id,
            amount = %reservation.amount,
            "funds reserved"
        );
        Ok(reservation)
    }

    pub async fn revenue(&self, reference: ReservationRef) -> Result<Reservation, AppError> {
        let reservation = self.store.revenue(reference).await?;

        tracing::info!(order_id = %reservation.order_id, amount = %reservation.amount, "reservation realized");
        Ok(reservation)
    }

    pub async fn refund(&self, reference: ReservationRef) -> Result<Reservation, AppError> {
        let reservation = self.store.refund(reference).await?;

        tracing::info!(order_id = %reservation.order_id, amount = %reservation.amount, "reservation refunded");
        Ok(reservation)
    }

    /// One page of an account's operation log.
    pub async fn history(
        &self,
        account_id: Uuid,
        query: HistoryQuery,
    ) -> Result<Vec<Operation>, AppError> {
        self.account_by_id(account_id).await?;

        self.store.operations(account_id, query).await
    }
}
