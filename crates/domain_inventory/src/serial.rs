//! Serialized asset tracking
//!
//! A serial's status, warehouse, lot and customer links are derived by
//! replaying its event history, ordered by time then id, through a fixed
//! transition table. Events that the table does not accept from the state
//! reached at their position are ignored.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use core_kernel::{
    CustomerId, InventoryItemId, OrderId, OrderLineId, Outcome, SerialId, SerialTransactionId, SkipReason,
    UserId, VendorId, WarehouseId,
};

use crate::error::InventoryError;
use crate::inventory::{InventoryLedger, TransferReceipt};

/// Physical status of a serialized asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SerialStatus {
    Empty,
    OnHand,
    Junked,
    Lost,
    Reserved,
    Rented,
    Sold,
    Sent,
    Maintenance,
    TransferredOut,
}

legacy_names!(SerialStatus, "serial status" {
    Empty => "Empty",
    OnHand => "On Hand",
    Junked => "Junked",
    Lost => "Lost",
    Reserved => "Reserved",
    Rented => "Rented",
    Sold => "Sold",
    Sent => "Sent",
    Maintenance => "Maintenance",
    TransferredOut => "Transferred Out",
});

/// Serial transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SerialEvent {
    Reserved,
    ReserveCancelled,
    Rented,
    Sold,
    Returned,
    Lost,
    Junked,
    O2TankOutForFilling,
    O2TankInFromFilling,
    O2TankOutToCustomer,
    O2TankInFromCustomer,
    OutForMaintenance,
    InFromMaintenance,
    TransferredOut,
    TransferredIn,
}

legacy_names!(SerialEvent, "serial transaction type" {
    Reserved => "Reserved",
    ReserveCancelled => "Reserve Cancelled",
    Rented => "Rented",
    Sold => "Sold",
    Returned => "Returned",
    Lost => "Lost",
    Junked => "Junked",
    O2TankOutForFilling => "O2 tank out for filling",
    O2TankInFromFilling => "O2 tank in from filling",
    O2TankOutToCustomer => "O2 tank out to customer",
    O2TankInFromCustomer => "O2 tank in from customer",
    OutForMaintenance => "Out for Maintenance",
    InFromMaintenance => "In from Maintenance",
    TransferredOut => "Transferred Out",
    TransferredIn => "Transferred In",
});

impl SerialEvent {
    /// Whether the event is valid from `from` (`None` is the unknown state)
    pub fn accepts(&self, from: Option<SerialStatus>) -> bool {
        use SerialStatus as S;
        let Some(from) = from else {
            return true;
        };
        match self {
            SerialEvent::Reserved => from == S::OnHand,
            SerialEvent::ReserveCancelled => from == S::Reserved,
            SerialEvent::Rented => matches!(from, S::OnHand | S::Reserved),
            SerialEvent::Sold => matches!(from, S::OnHand | S::Reserved | S::Rented),
            SerialEvent::Returned => from != S::Maintenance,
            SerialEvent::Lost | SerialEvent::Junked => true,
            SerialEvent::O2TankOutForFilling => from == S::Empty,
            SerialEvent::O2TankInFromFilling => from == S::Sent,
            SerialEvent::O2TankOutToCustomer => from == S::OnHand,
            SerialEvent::O2TankInFromCustomer => from == S::Rented,
            SerialEvent::OutForMaintenance => from == S::OnHand,
            SerialEvent::InFromMaintenance => from == S::Maintenance,
            SerialEvent::TransferredOut => from == S::OnHand,
            SerialEvent::TransferredIn => from == S::TransferredOut,
        }
    }

    /// Status reached after the event
    pub fn target(&self) -> SerialStatus {
        match self {
            SerialEvent::Reserved => SerialStatus::Reserved,
            SerialEvent::ReserveCancelled
            | SerialEvent::O2TankInFromFilling
            | SerialEvent::InFromMaintenance
            | SerialEvent::TransferredIn => SerialStatus::OnHand,
            SerialEvent::Rented | SerialEvent::O2TankOutToCustomer => SerialStatus::Rented,
            SerialEvent::Sold => SerialStatus::Sold,
            SerialEvent::Returned | SerialEvent::OutForMaintenance => SerialStatus::Maintenance,
            SerialEvent::Lost => SerialStatus::Lost,
            SerialEvent::Junked => SerialStatus::Junked,
            SerialEvent::O2TankOutForFilling => SerialStatus::Sent,
            SerialEvent::O2TankInFromCustomer => SerialStatus::Empty,
            SerialEvent::TransferredOut => SerialStatus::TransferredOut,
        }
    }

    /// Events allowed to give a warehouse to a serial that has none
    fn assigns_warehouse(&self) -> bool {
        matches!(self, SerialEvent::InFromMaintenance | SerialEvent::TransferredIn)
    }
}

/// One row of a serial's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialTransaction {
    pub id: SerialTransactionId,
    pub serial_id: SerialId,
    pub event: SerialEvent,
    pub time: NaiveDateTime,
    pub warehouse_id: Option<WarehouseId>,
    pub vendor_id: Option<VendorId>,
    pub customer_id: Option<CustomerId>,
    pub order_id: Option<OrderId>,
    pub order_line_id: Option<OrderLineId>,
    pub lot_number: Option<String>,
    pub actor: UserId,
}

impl SerialTransaction {
    /// Same event with the same parameters, ignoring id and actor
    fn same_event(&self, other: &SerialTransaction) -> bool {
        self.event == other.event
            && self.time == other.time
            && self.warehouse_id == other.warehouse_id
            && self.vendor_id == other.vendor_id
            && self.customer_id == other.customer_id
            && self.order_id == other.order_id
            && self.order_line_id == other.order_line_id
            && self.lot_number == other.lot_number
    }
}

/// A proposed serial event
#[derive(Debug, Clone)]
pub struct SerialEventDraft {
    pub event: SerialEvent,
    pub time: NaiveDateTime,
    pub warehouse_id: Option<WarehouseId>,
    pub vendor_id: Option<VendorId>,
    pub customer_id: Option<CustomerId>,
    pub order_id: Option<OrderId>,
    pub order_line_id: Option<OrderLineId>,
    pub lot_number: Option<String>,
    pub actor: UserId,
}

impl SerialEventDraft {
    pub fn new(event: SerialEvent, time: NaiveDateTime, actor: UserId) -> Self {
        Self {
            event,
            time,
            warehouse_id: None,
            vendor_id: None,
            customer_id: None,
            order_id: None,
            order_line_id: None,
            lot_number: None,
            actor,
        }
    }

    pub fn with_warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn with_vendor(mut self, vendor_id: VendorId) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_order(mut self, order_id: OrderId, order_line_id: Option<OrderLineId>) -> Self {
        self.order_id = Some(order_id);
        self.order_line_id = order_line_id;
        self
    }

    pub fn with_lot(mut self, lot_number: impl Into<String>) -> Self {
        self.lot_number = Some(lot_number.into());
        self
    }

    fn into_transaction(self, id: SerialTransactionId, serial_id: SerialId) -> SerialTransaction {
        SerialTransaction {
            id,
            serial_id,
            event: self.event,
            time: self.time,
            warehouse_id: self.warehouse_id,
            vendor_id: self.vendor_id,
            customer_id: self.customer_id,
            order_id: self.order_id,
            order_line_id: self.order_line_id,
            lot_number: self.lot_number,
            actor: self.actor,
        }
    }
}

/// Derived fields of a serial
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialState {
    /// `None` until the first accepted event
    pub status: Option<SerialStatus>,
    pub warehouse_id: Option<WarehouseId>,
    pub lot_number: Option<String>,
    pub sold_date: Option<chrono::NaiveDate>,
    pub current_customer_id: Option<CustomerId>,
    pub last_customer_id: Option<CustomerId>,
    pub vendor_id: Option<VendorId>,
    pub order_id: Option<OrderId>,
}

impl SerialState {
    /// Applies one event; returns false when the event is not accepted
    pub fn apply(&mut self, tx: &SerialTransaction) -> bool {
        if !tx.event.accepts(self.status) {
            return false;
        }

        if let Some(warehouse_id) = tx.warehouse_id {
            if self.warehouse_id.is_some() || tx.event.assigns_warehouse() {
                self.warehouse_id = Some(warehouse_id);
            }
        }

        match tx.event {
            SerialEvent::Reserved => {
                self.current_customer_id = tx.customer_id;
                self.order_id = tx.order_id;
            }
            SerialEvent::ReserveCancelled => {
                self.current_customer_id = None;
                self.order_id = None;
            }
            SerialEvent::Rented | SerialEvent::O2TankOutToCustomer => {
                self.current_customer_id = tx.customer_id;
                if tx.order_id.is_some() {
                    self.order_id = tx.order_id;
                }
            }
            SerialEvent::Sold => {
                self.current_customer_id = tx.customer_id;
                self.sold_date = Some(tx.time.date());
            }
            SerialEvent::Returned | SerialEvent::O2TankInFromCustomer => {
                if self.current_customer_id.is_some() {
                    self.last_customer_id = self.current_customer_id.take();
                }
                self.order_id = None;
            }
            SerialEvent::Lost | SerialEvent::Junked => {
                self.warehouse_id = None;
                self.current_customer_id = None;
                self.vendor_id = None;
                self.order_id = None;
            }
            SerialEvent::O2TankOutForFilling => self.vendor_id = tx.vendor_id,
            SerialEvent::O2TankInFromFilling => {
                self.vendor_id = None;
                if tx.lot_number.is_some() {
                    self.lot_number = tx.lot_number.clone();
                }
            }
            SerialEvent::OutForMaintenance
            | SerialEvent::InFromMaintenance
            | SerialEvent::TransferredOut
            | SerialEvent::TransferredIn => {}
        }

        self.status = Some(tx.event.target());
        true
    }
}

/// Replays a history in (time, id) order
///
/// # Returns
///
/// The final state and the ids of the rows that were accepted.
pub fn replay<'a>(
    history: impl IntoIterator<Item = &'a SerialTransaction>,
) -> (SerialState, Vec<SerialTransactionId>) {
    let mut ordered: Vec<&SerialTransaction> = history.into_iter().collect();
    ordered.sort_by_key(|tx| (tx.time, tx.id));

    let mut state = SerialState::default();
    let mut accepted = Vec::new();
    for tx in ordered {
        if state.apply(tx) {
            accepted.push(tx.id);
        }
    }
    (state, accepted)
}

/// A serialized asset with its history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Serial {
    pub id: SerialId,
    pub item_id: InventoryItemId,
    pub serial_number: String,
    pub state: SerialState,
    pub history: Vec<SerialTransaction>,
}

impl Serial {
    pub fn new(id: SerialId, item_id: InventoryItemId, serial_number: impl Into<String>) -> Self {
        Self {
            id,
            item_id,
            serial_number: serial_number.into(),
            state: SerialState::default(),
            history: Vec::new(),
        }
    }

    /// Serial over a persisted history; the derived state is replayed
    ///
    /// # Errors
    ///
    /// Returns `SerialMismatch` if a row belongs to another serial.
    pub fn from_history(
        id: SerialId,
        item_id: InventoryItemId,
        serial_number: impl Into<String>,
        history: Vec<SerialTransaction>,
    ) -> Result<Self, InventoryError> {
        if let Some(foreign) = history.iter().find(|tx| tx.serial_id != id) {
            return Err(InventoryError::SerialMismatch {
                expected: id,
                found: foreign.serial_id,
            });
        }
        let (state, _) = replay(&history);
        Ok(Self {
            id,
            item_id,
            serial_number: serial_number.into(),
            state,
            history,
        })
    }

    pub fn status(&self) -> Option<SerialStatus> {
        self.state.status
    }

    /// Records an event by replaying the history with it included
    ///
    /// The proposed row is kept only when the replay accepts it at its
    /// position in time; the serial's derived fields are then rewritten from
    /// the replay. `next_id` is the id the row takes if kept.
    ///
    /// # Returns
    ///
    /// `Skipped(AlreadyRecorded)` for a re-submitted identical event, and
    /// `Skipped(InvalidTransition)` when the event is not accepted.
    pub fn add_transaction(
        &mut self,
        draft: SerialEventDraft,
        next_id: SerialTransactionId,
    ) -> Outcome<SerialTransactionId> {
        let proposed = draft.into_transaction(next_id, self.id);
        if self.history.iter().any(|tx| tx.same_event(&proposed)) {
            return Outcome::Skipped(SkipReason::AlreadyRecorded);
        }

        let (state, accepted) = replay(self.history.iter().chain(std::iter::once(&proposed)));
        if !accepted.contains(&proposed.id) {
            let from = self
                .state_before(&proposed)
                .map_or("Unknown", |status| status.legacy_name());
            debug!(serial_id = %self.id, event = %proposed.event, from, "Serial event ignored");
            return Outcome::Skipped(SkipReason::InvalidTransition {
                event: proposed.event.to_string(),
                from: from.to_string(),
            });
        }

        debug!(serial_id = %self.id, event = %proposed.event, "Serial event recorded");
        self.history.push(proposed);
        self.state = state;
        Outcome::Applied(next_id)
    }

    fn state_before(&self, proposed: &SerialTransaction) -> Option<SerialStatus> {
        let earlier = self
            .history
            .iter()
            .filter(|tx| (tx.time, tx.id) < (proposed.time, proposed.id));
        replay(earlier).0.status
    }
}

/// Receipt for a serial moved between warehouses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialTransfer {
    pub transferred_out: SerialTransactionId,
    pub transferred_in: SerialTransactionId,
    pub stock: Option<TransferReceipt>,
}

/// Moves a serial to another warehouse
///
/// Records "Transferred Out" from the serial's current warehouse and
/// "Transferred In" to `destination`, then moves one unit in the stock
/// ledger. The stock transfer runs only when both serial rows were
/// recorded; if the second is refused the first is withdrawn.
///
/// `next_id` is the first of two consecutive ids for the new rows.
pub fn transfer_serial(
    serial: &mut Serial,
    ledger: &mut InventoryLedger,
    destination: WarehouseId,
    time: NaiveDateTime,
    next_id: SerialTransactionId,
    actor: UserId,
) -> Outcome<SerialTransfer> {
    let Some(source) = serial.state.warehouse_id else {
        return Outcome::Skipped(SkipReason::MissingParameter("serial warehouse".to_string()));
    };
    if source == destination {
        return Outcome::Skipped(SkipReason::SameLocation);
    }

    let snapshot = serial.clone();
    let out = serial.add_transaction(
        SerialEventDraft::new(SerialEvent::TransferredOut, time, actor).with_warehouse(source),
        next_id,
    );
    let transferred_out = match out {
        Outcome::Applied(id) => id,
        Outcome::Skipped(reason) => return Outcome::Skipped(reason),
    };
    let into = serial.add_transaction(
        SerialEventDraft::new(SerialEvent::TransferredIn, time, actor).with_warehouse(destination),
        next_id.next(),
    );
    let transferred_in = match into {
        Outcome::Applied(id) => id,
        Outcome::Skipped(reason) => {
            *serial = snapshot;
            return Outcome::Skipped(reason);
        }
    };

    let stock = ledger
        .transfer(serial.item_id, Some(source), Some(destination), 1, time.date(), actor)
        .applied();
    info!(serial_id = %serial.id, from = %source, to = %destination, "Serial transferred");
    Outcome::Applied(SerialTransfer {
        transferred_out,
        transferred_in,
        stock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn serial() -> Serial {
        Serial::new(SerialId::new(1), InventoryItemId::new(2), "SN-001")
    }

    fn record(serial: &mut Serial, draft: SerialEventDraft) -> Outcome<SerialTransactionId> {
        let next = SerialTransactionId::new(serial.history.len() as i64 + 1);
        serial.add_transaction(draft, next)
    }

    #[test]
    fn test_legacy_names_round_trip() {
        for event in SerialEvent::ALL {
            assert_eq!(event.legacy_name().parse::<SerialEvent>().unwrap(), *event);
        }
        assert_eq!("On Hand".parse::<SerialStatus>().unwrap(), SerialStatus::OnHand);
    }

    #[test]
    fn test_transition_table_from_maintenance() {
        let from = Some(SerialStatus::Maintenance);
        assert!(!SerialEvent::Sold.accepts(from));
        assert!(!SerialEvent::Returned.accepts(from));
        assert!(SerialEvent::InFromMaintenance.accepts(from));
        assert!(SerialEvent::Lost.accepts(from));
        assert!(!SerialEvent::InFromMaintenance.accepts(Some(SerialStatus::Rented)));
    }

    #[test]
    fn test_unknown_state_accepts_everything() {
        for event in SerialEvent::ALL {
            assert!(event.accepts(None));
        }
    }

    #[test]
    fn test_rental_cycle() {
        let mut s = serial();
        let u = UserId::new(1);
        assert!(record(&mut s, SerialEventDraft::new(SerialEvent::TransferredIn, at(1, 9), u).with_warehouse(WarehouseId::new(3))).is_applied());
        assert!(record(&mut s, SerialEventDraft::new(SerialEvent::Rented, at(2, 9), u).with_customer(CustomerId::new(8))).is_applied());
        assert_eq!(s.state.current_customer_id, Some(CustomerId::new(8)));

        assert!(record(&mut s, SerialEventDraft::new(SerialEvent::Returned, at(3, 9), u).with_warehouse(WarehouseId::new(4))).is_applied());
        assert_eq!(s.status(), Some(SerialStatus::Maintenance));
        assert_eq!(s.state.current_customer_id, None);
        assert_eq!(s.state.last_customer_id, Some(CustomerId::new(8)));
        assert_eq!(s.state.warehouse_id, Some(WarehouseId::new(4)));
    }

    #[test]
    fn test_only_transfer_in_or_maintenance_assigns_warehouse() {
        let mut s = serial();
        let u = UserId::new(1);
        let _ = record(&mut s, SerialEventDraft::new(SerialEvent::OutForMaintenance, at(1, 9), u).with_warehouse(WarehouseId::new(3)));
        assert_eq!(s.state.warehouse_id, None);

        let _ = record(&mut s, SerialEventDraft::new(SerialEvent::InFromMaintenance, at(2, 9), u).with_warehouse(WarehouseId::new(3)));
        assert_eq!(s.state.warehouse_id, Some(WarehouseId::new(3)));
        assert_eq!(s.status(), Some(SerialStatus::OnHand));
    }

    #[test]
    fn test_invalid_event_is_skipped_without_row() {
        let mut s = serial();
        let u = UserId::new(1);
        let _ = record(&mut s, SerialEventDraft::new(SerialEvent::OutForMaintenance, at(1, 9), u));

        let sold = record(&mut s, SerialEventDraft::new(SerialEvent::Sold, at(2, 9), u).with_customer(CustomerId::new(1)));
        assert!(matches!(sold, Outcome::Skipped(SkipReason::InvalidTransition { .. })));
        assert_eq!(s.history.len(), 1);
        assert_eq!(s.status(), Some(SerialStatus::Maintenance));
    }

    #[test]
    fn test_resubmitted_event_is_recorded_once() {
        let mut s = serial();
        let u = UserId::new(1);
        let draft = SerialEventDraft::new(SerialEvent::Lost, at(1, 9), u);
        assert!(record(&mut s, draft.clone()).is_applied());
        assert_eq!(record(&mut s, draft), Outcome::Skipped(SkipReason::AlreadyRecorded));
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn test_backdated_event_replays_in_time_order() {
        let mut s = serial();
        let u = UserId::new(1);
        let _ = record(&mut s, SerialEventDraft::new(SerialEvent::InFromMaintenance, at(1, 9), u).with_warehouse(WarehouseId::new(1)));
        let _ = record(&mut s, SerialEventDraft::new(SerialEvent::Sold, at(10, 9), u).with_customer(CustomerId::new(2)));

        // reserved before the sale: still valid at its position
        let reserved = record(
            &mut s,
            SerialEventDraft::new(SerialEvent::Reserved, at(5, 9), u).with_customer(CustomerId::new(2)),
        );
        assert!(reserved.is_applied());
        assert_eq!(s.status(), Some(SerialStatus::Sold));
        assert_eq!(s.state.sold_date, NaiveDate::from_ymd_opt(2024, 4, 10));
    }
}
