//! QR checkout tickets
//!
//! Issue persists the ticket and signs a token for it. Verify and redeem
//! both require a valid signature *and* a stored ticket that is still
//! issued; redeem claims the ticket with a conditional update before any
//! loan, return, visit or checkout is performed.

use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    config::TicketsConfig,
    error::{AppError, AppResult},
    models::{
        attendance::AttendanceSource,
        copy::normalize_barcode,
        ticket::{
            IssueTicket, IssuedTicket, RedeemItem, RedeemOutcome, Ticket, TicketClaims, TicketPreview,
            TicketPurpose, TicketQuery, TicketState, TicketView,
        },
        UserClaims,
    },
    qr::{self, QrRenderer},
    repository::{tickets::NewTicket, Repository},
    services::{attendance::AttendanceService, equipment::EquipmentService, loans::LoansService},
};

/// Image or data URI for a ticket's QR code
pub enum TicketQr {
    Image { mime_type: &'static str, bytes: Vec<u8> },
    DataUri(String),
}

#[derive(Clone)]
pub struct TicketsService {
    repository: Repository,
    config: TicketsConfig,
    qr: Arc<dyn QrRenderer>,
    loans: LoansService,
    attendance: AttendanceService,
    equipment: EquipmentService,
}

impl TicketsService {
    pub fn new(
        repository: Repository,
        config: TicketsConfig,
        qr: Arc<dyn QrRenderer>,
        loans: LoansService,
        attendance: AttendanceService,
        equipment: EquipmentService,
    ) -> Self {
        Self { repository, config, qr, loans, attendance, equipment }
    }

    /// Copy ids from explicit ids and barcodes, without duplicates
    async fn resolve_copies(&self, request: &IssueTicket) -> AppResult<Vec<i32>> {
        let mut ids = request.copy_ids.clone();
        for raw in &request.barcodes {
            let barcode = normalize_barcode(raw).map_err(AppError::Validation)?;
            ids.push(self.repository.copies.get_by_barcode(&barcode).await?.id);
        }
        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));
        Ok(ids)
    }

    async fn check_borrow_items(&self, holder_id: i32, copy_ids: &[i32]) -> AppResult<()> {
        let max = self.loans.policy().max_loans;
        if copy_ids.is_empty() || copy_ids.len() as i64 > max {
            return Err(AppError::Validation(format!(
                "A borrow ticket lists 1 to {} copies",
                max
            )));
        }

        let copies = self.repository.copies.get_many(copy_ids).await?;
        if let Some(missing) = copy_ids.iter().find(|id| !copies.iter().any(|c| c.id == **id)) {
            return Err(AppError::NotFound(format!("Copy with id {} not found", missing)));
        }
        if let Some(copy) = copies.iter().find(|c| !c.is_available()) {
            return Err(AppError::BusinessRule(format!("Copy {} is not available", copy.barcode)));
        }

        let (active, overdue) = self.repository.loans.count_for_user(holder_id).await?;
        self.loans.policy().check_borrow(active, overdue, copy_ids.len() as i64)
    }

    async fn check_return_items(&self, holder_id: i32, copy_ids: &[i32]) -> AppResult<()> {
        if copy_ids.is_empty() {
            return Err(AppError::Validation("A return ticket lists at least one copy".to_string()));
        }
        for copy_id in copy_ids {
            let on_loan_to_holder = self
                .repository
                .loans
                .get_open_for_copy(*copy_id)
                .await?
                .map(|loan| loan.user_id == holder_id)
                .unwrap_or(false);
            if !on_loan_to_holder {
                return Err(AppError::BusinessRule(format!(
                    "Copy {} is not on loan to this user",
                    copy_id
                )));
            }
        }
        Ok(())
    }

    /// Issue a ticket for the caller, or for any user when staff
    pub async fn issue(&self, caller: &UserClaims, request: IssueTicket) -> AppResult<IssuedTicket> {
        let holder_id = request.user_id.unwrap_or(caller.user_id);
        if holder_id != caller.user_id && !caller.is_staff() {
            return Err(AppError::Authorization("You can only issue tickets for yourself".to_string()));
        }

        let holder = self.repository.users.get_by_id(holder_id).await?;
        if !holder.is_active() {
            return Err(AppError::BusinessRule(format!("User account is {}", holder.status)));
        }

        let copy_ids = self.resolve_copies(&request).await?;

        match request.purpose {
            TicketPurpose::Borrow | TicketPurpose::Return if request.equipment_id.is_some() => {
                return Err(AppError::Validation("equipment_id is only used by equipment tickets".to_string()));
            }
            TicketPurpose::Borrow => self.check_borrow_items(holder_id, &copy_ids).await?,
            TicketPurpose::Return => self.check_return_items(holder_id, &copy_ids).await?,
            TicketPurpose::Attendance => {
                if !copy_ids.is_empty() || request.equipment_id.is_some() {
                    return Err(AppError::Validation("Attendance tickets carry no items".to_string()));
                }
            }
            TicketPurpose::Equipment => {
                if !copy_ids.is_empty() {
                    return Err(AppError::Validation("Equipment tickets carry no copies".to_string()));
                }
                let equipment_id = request.equipment_id.ok_or_else(|| {
                    AppError::Validation("equipment_id is required for equipment tickets".to_string())
                })?;
                self.repository.equipment.get_by_id(equipment_id).await?.status.check_checkout()?;
            }
        }

        let ticket = self
            .repository
            .tickets
            .create(NewTicket {
                user_id: holder_id,
                purpose: request.purpose,
                copy_ids: &copy_ids,
                equipment_id: request.equipment_id,
                issued_by: caller.user_id,
                expires_at: Utc::now() + Duration::minutes(self.config.lifetime_minutes),
            })
            .await?;

        let token = TicketClaims::for_ticket(&ticket).sign(&self.config.secret)?;
        let qr_url = self.qr.image_url(&token);

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = holder_id,
            purpose = %ticket.purpose,
            items = ticket.copy_ids.len(),
            issued_by = caller.user_id,
            "Ticket issued"
        );

        Ok(IssuedTicket {
            expires_at: ticket.expires_at,
            ticket: TicketView::new(ticket, Utc::now()),
            token,
            qr_url,
        })
    }

    /// Signature, then the stored ticket it names
    async fn load_verified(&self, token: &str) -> AppResult<Ticket> {
        let claims = TicketClaims::verify(token, &self.config.secret)?;
        let ticket = self
            .repository
            .tickets
            .get_by_id(claims.ticket_id()?)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::TicketInvalid("Unknown ticket".to_string()),
                other => other,
            })?;

        if ticket.user_id != claims.user_id()? || ticket.purpose != claims.purpose {
            return Err(AppError::TicketInvalid("Ticket does not match its record".to_string()));
        }
        Ok(ticket)
    }

    /// Scanner preview: valid, issued ticket and its holder
    pub async fn verify(&self, token: &str) -> AppResult<TicketPreview> {
        let ticket = self.load_verified(token).await?;
        let now = Utc::now();
        ticket.check_usable(now)?;

        let holder = self.repository.users.get_short(ticket.user_id).await?;
        Ok(TicketPreview { ticket: TicketView::new(ticket, now), holder })
    }

    /// Claim the ticket, then perform what it was issued for
    pub async fn redeem(&self, caller: &UserClaims, token: &str) -> AppResult<RedeemOutcome> {
        let ticket = self.load_verified(token).await?;
        ticket.check_usable(Utc::now())?;

        let ticket = match self.repository.tickets.claim(ticket.id, caller.user_id).await? {
            Some(claimed) => claimed,
            None => {
                // Lost the race, or expired in between
                let current = self.repository.tickets.get_by_id(ticket.id).await?;
                current.check_usable(Utc::now())?;
                return Err(AppError::TicketInvalid("Ticket has already been used".to_string()));
            }
        };

        let holder_user = self.repository.users.get_by_id(ticket.user_id).await?;
        let mut items = Vec::new();
        let mut attendance = None;

        match ticket.purpose {
            TicketPurpose::Borrow => {
                for copy_id in &ticket.copy_ids {
                    let result = async {
                        let copy = self.repository.copies.get_by_id(*copy_id).await?;
                        self.loans.lend(&holder_user, &copy, false, Some(ticket.id)).await
                    }
                    .await;
                    items.push(match result {
                        Ok(loan) => RedeemItem {
                            copy_id: Some(*copy_id),
                            equipment_id: None,
                            ok: true,
                            loan_id: Some(loan.id),
                            due_date: Some(loan.due_date),
                            error: None,
                        },
                        Err(e) => RedeemItem::failed(Some(*copy_id), None, &e),
                    });
                }
            }
            TicketPurpose::Return => {
                for copy_id in &ticket.copy_ids {
                    items.push(match self.loans.return_copy_for_user(ticket.user_id, *copy_id).await {
                        Ok(loan) => RedeemItem {
                            copy_id: Some(*copy_id),
                            equipment_id: None,
                            ok: true,
                            loan_id: Some(loan.id),
                            due_date: None,
                            error: None,
                        },
                        Err(e) => RedeemItem::failed(Some(*copy_id), None, &e),
                    });
                }
            }
            TicketPurpose::Attendance => {
                match self
                    .attendance
                    .toggle(ticket.user_id, AttendanceSource::Qr, Some(caller.user_id))
                    .await
                {
                    Ok(event) => attendance = Some(event),
                    Err(e) => {
                        tracing::warn!(ticket_id = %ticket.id, error = %e, "Attendance ticket redeemed without a visit change");
                        items.push(RedeemItem::failed(None, None, &e));
                    }
                }
            }
            TicketPurpose::Equipment => {
                let equipment_id = ticket.equipment_id.ok_or_else(|| {
                    AppError::Internal(format!("Equipment ticket {} has no equipment", ticket.id))
                })?;
                items.push(
                    match self
                        .equipment
                        .checkout_for(equipment_id, ticket.user_id, None, Some(ticket.id))
                        .await
                    {
                        Ok(loan) => RedeemItem {
                            copy_id: None,
                            equipment_id: Some(equipment_id),
                            ok: true,
                            loan_id: Some(loan.id),
                            due_date: Some(loan.due_date),
                            error: None,
                        },
                        Err(e) => RedeemItem::failed(None, Some(equipment_id), &e),
                    },
                );
            }
        }

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = ticket.user_id,
            purpose = %ticket.purpose,
            redeemed_by = caller.user_id,
            succeeded = items.iter().filter(|i| i.ok).count(),
            failed = items.iter().filter(|i| !i.ok).count(),
            "Ticket redeemed"
        );

        let holder = self.repository.users.get_short(ticket.user_id).await?;
        Ok(RedeemOutcome {
            ticket: TicketView::new(ticket, Utc::now()),
            holder,
            items,
            attendance,
        })
    }

    /// Holder or staff may see a ticket
    fn check_access(caller: &UserClaims, ticket: &Ticket) -> AppResult<()> {
        if ticket.user_id == caller.user_id || caller.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Not your ticket".to_string()))
        }
    }

    pub async fn get(&self, caller: &UserClaims, id: Uuid) -> AppResult<TicketView> {
        let ticket = self.repository.tickets.get_by_id(id).await?;
        Self::check_access(caller, &ticket)?;
        Ok(TicketView::new(ticket, Utc::now()))
    }

    pub async fn revoke(&self, caller: &UserClaims, id: Uuid) -> AppResult<TicketView> {
        let ticket = self.repository.tickets.get_by_id(id).await?;
        Self::check_access(caller, &ticket)?;

        match self.repository.tickets.revoke(id).await? {
            Some(revoked) => {
                tracing::info!(ticket_id = %id, revoked_by = caller.user_id, "Ticket revoked");
                Ok(TicketView::new(revoked, Utc::now()))
            }
            None => Err(AppError::BusinessRule(format!(
                "Only issued tickets can be revoked (ticket is {})",
                ticket.status
            ))),
        }
    }

    pub async fn list_mine(&self, caller: &UserClaims, status: Option<TicketState>) -> AppResult<Vec<TicketView>> {
        let now = Utc::now();
        Ok(self
            .repository
            .tickets
            .list(Some(caller.user_id), status)
            .await?
            .into_iter()
            .map(|t| TicketView::new(t, now))
            .collect())
    }

    pub async fn list(&self, query: &TicketQuery) -> AppResult<Vec<TicketView>> {
        let now = Utc::now();
        Ok(self
            .repository
            .tickets
            .list(query.user_id, query.status)
            .await?
            .into_iter()
            .map(|t| TicketView::new(t, now))
            .collect())
    }

    /// QR image of a usable ticket, as bytes or a data URI
    pub async fn ticket_qr(&self, caller: &UserClaims, id: Uuid, inline: bool) -> AppResult<TicketQr> {
        let ticket = self.repository.tickets.get_by_id(id).await?;
        Self::check_access(caller, &ticket)?;
        ticket.check_usable(Utc::now())?;

        let token = TicketClaims::for_ticket(&ticket).sign(&self.config.secret)?;
        if inline {
            Ok(TicketQr::DataUri(qr::data_uri(self.qr.as_ref(), &token).await?))
        } else {
            Ok(TicketQr::Image {
                mime_type: self.qr.mime_type(),
                bytes: self.qr.render(&token).await?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ticket::TicketStatus, user::Role};

    fn claims(user_id: i32, role: Role) -> UserClaims {
        let now = Utc::now().timestamp();
        UserClaims { sub: "u".to_string(), user_id, role, exp: now + 60, iat: now }
    }

    fn ticket(user_id: i32) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            user_id,
            purpose: TicketPurpose::Attendance,
            copy_ids: vec![],
            equipment_id: None,
            status: TicketStatus::Issued,
            issued_by: Some(user_id),
            issued_at: now,
            expires_at: now + Duration::minutes(10),
            redeemed_at: None,
            redeemed_by: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_ticket_access() {
        let t = ticket(5);
        assert!(TicketsService::check_access(&claims(5, Role::Student), &t).is_ok());
        assert!(TicketsService::check_access(&claims(6, Role::Student), &t).is_err());
        assert!(TicketsService::check_access(&claims(6, Role::Scanner), &t).is_err());
        assert!(TicketsService::check_access(&claims(6, Role::Librarian), &t).is_ok());
    }
}
