//! Bankroll allocator: the pipeline's single serialization point.
//!
//! Stakes move through reserve → commit, or reserve → rollback. Every
//! mutation happens under one lock, and `committed + reserved <= balance`
//! holds after every call. Reservation handles are consumed by commit and
//! rollback, so each settles exactly once; a handle dropped unsettled
//! (early return, panic, aborted build) releases its reservation.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::types::AllocationError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollState {
    pub balance: Decimal,
    pub reserved: Decimal,
    pub committed: Decimal,
}

impl fmt::Display for BankrollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance=${:.2} reserved=${:.2} committed=${:.2} available=${:.2}",
            self.balance,
            self.reserved,
            self.committed,
            self.available(),
        )
    }
}

impl BankrollState {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            reserved: Decimal::ZERO,
            committed: Decimal::ZERO,
        }
    }

    pub fn available(&self) -> Decimal {
        self.balance - self.reserved - self.committed
    }

    pub fn is_consistent(&self) -> bool {
        self.reserved >= Decimal::ZERO
            && self.committed >= Decimal::ZERO
            && self.committed + self.reserved <= self.balance
    }
}

#[derive(Debug)]
struct Ledger {
    state: BankrollState,
    outstanding: HashMap<u64, Decimal>,
    next_id: u64,
}

impl Ledger {
    fn release(&mut self, id: u64) -> Option<Decimal> {
        let amount = self.outstanding.remove(&id)?;
        self.state.reserved -= amount;
        Some(amount)
    }
}

// ---------------------------------------------------------------------------
// Reservation handle
// ---------------------------------------------------------------------------

/// An outstanding reservation. Settle it with `BankrollAllocator::commit`
/// or `BankrollAllocator::rollback`; dropping it unsettled rolls it back.
#[must_use = "an unsettled reservation is rolled back when dropped"]
#[derive(Debug)]
pub struct ReservationHandle {
    id: u64,
    amount: Decimal,
    ledger: Weak<Mutex<Ledger>>,
    settled: bool,
}

impl ReservationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

impl Drop for ReservationHandle {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(ledger) = self.ledger.upgrade() {
            if let Some(amount) = ledger.lock().release(self.id) {
                warn!(
                    reservation = self.id,
                    amount = format!("${:.2}", amount),
                    "Unsettled reservation released"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Cloneable handle to one bankroll; clones share the same ledger.
#[derive(Debug, Clone)]
pub struct BankrollAllocator {
    ledger: Arc<Mutex<Ledger>>,
}

impl BankrollAllocator {
    pub fn new(balance: Decimal) -> Result<Self, AllocationError> {
        if balance < Decimal::ZERO {
            return Err(AllocationError::InvalidBalance(balance));
        }
        info!(balance = format!("${:.2}", balance), "Bankroll opened");
        Ok(Self {
            ledger: Arc::new(Mutex::new(Ledger {
                state: BankrollState::new(balance),
                outstanding: HashMap::new(),
                next_id: 1,
            })),
        })
    }

    /// Atomically move `amount` from available into reserved.
    pub fn reserve(&self, amount: Decimal) -> Result<ReservationHandle, AllocationError> {
        if amount <= Decimal::ZERO {
            return Err(AllocationError::InvalidAmount(amount));
        }

        let mut ledger = self.ledger.lock();
        let available = ledger.state.available();
        if amount > available {
            return Err(AllocationError::InsufficientBankroll {
                requested: amount,
                available,
            });
        }

        let id = ledger.next_id;
        ledger.next_id += 1;
        ledger.state.reserved += amount;
        ledger.outstanding.insert(id, amount);

        debug!(reservation = id, amount = format!("${:.2}", amount), "Stake reserved");

        Ok(ReservationHandle {
            id,
            amount,
            ledger: Arc::downgrade(&self.ledger),
            settled: false,
        })
    }

    /// Convert a reservation into a permanent charge.
    pub fn commit(&self, mut handle: ReservationHandle) -> Result<Decimal, AllocationError> {
        self.check_owner(&handle)?;

        let mut ledger = self.ledger.lock();
        let amount = ledger
            .release(handle.id)
            .ok_or(AllocationError::UnknownReservation(handle.id))?;
        ledger.state.committed += amount;
        handle.settled = true;

        debug!(reservation = handle.id, amount = format!("${:.2}", amount), "Stake committed");
        Ok(amount)
    }

    /// Return a reservation to the available balance.
    pub fn rollback(&self, mut handle: ReservationHandle) -> Result<Decimal, AllocationError> {
        self.check_owner(&handle)?;

        let amount = self
            .ledger
            .lock()
            .release(handle.id)
            .ok_or(AllocationError::UnknownReservation(handle.id))?;
        handle.settled = true;

        debug!(reservation = handle.id, amount = format!("${:.2}", amount), "Stake rolled back");
        Ok(amount)
    }

    pub fn available(&self) -> Decimal {
        self.ledger.lock().state.available()
    }

    /// Starting balance.
    pub fn balance(&self) -> Decimal {
        self.ledger.lock().state.balance
    }

    pub fn snapshot(&self) -> BankrollState {
        self.ledger.lock().state.clone()
    }

    fn check_owner(&self, handle: &ReservationHandle) -> Result<(), AllocationError> {
        if Weak::ptr_eq(&handle.ledger, &Arc::downgrade(&self.ledger)) {
            Ok(())
        } else {
            Err(AllocationError::UnknownReservation(handle.id))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
