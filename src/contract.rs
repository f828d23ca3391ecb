//! Contract records referenced by claims, submissions and disagreements
use super::deadline::TimeStamp;
use super::error::{EngineError, EngineResult, ValidationError};
use super::role::Action;

/// Currency amount in minor units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(pub i64);

impl Money {
    /// Whole currency units; any `i32` count of units fits in minor units.
    pub fn from_major(units: i32) -> Self {
        Money(i64::from(units) * 100)
    }
    pub fn minor(&self) -> i64 {
        self.0
    }
    pub fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        if self.0 < 0 {
            return Err(ValidationError::NegativeAmount(field));
        }
        Ok(())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.0.abs() / 100, self.0.abs() % 100)
    }
}

impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Money(d.i64()?))
    }
}

/// Basis points; 10_000 is 100%.
pub type Percent = u32;

const MAX_BASIS_POINTS: Percent = 10_000;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Active,
    #[n(2)]
    Completed,
    #[n(3)]
    Terminated,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub contract_number: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub accepted_amount: Money,
    #[n(4)]
    pub advance_payment: Percent,
    #[n(5)]
    pub retention: Percent,
    #[n(6)]
    pub delay_damages_rate: Percent,
    #[n(7)]
    pub delay_damages_cap: Percent,
    #[n(8)]
    pub time_for_completion_days: u32,
    #[n(9)]
    pub commencement_date: Option<TimeStamp>,
    #[n(10)]
    pub status: ContractStatus,
    #[n(11)]
    pub owner_id: String, // the engineer or employer who registered it
    #[n(12)]
    pub engineer_id: Option<String>, // assigned engineer, if scoping is used
    #[n(13)]
    pub created_at: TimeStamp,
}

// Used for constructing a contract before registration
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContractDetails {
    contract_number: String,
    title: String,
    accepted_amount: Money,
    advance_payment: Percent,
    retention: Percent,
    delay_damages_rate: Percent,
    delay_damages_cap: Percent,
    time_for_completion_days: u32,
    commencement_date: Option<TimeStamp>,
    engineer_id: Option<String>,
}

impl ContractDetails {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_contract_number(mut self, number: &str) -> Self {
        self.contract_number = number.trim().to_string();
        self
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = title.trim().to_string();
        self
    }
    pub fn set_accepted_amount(mut self, amount: Money) -> Self {
        self.accepted_amount = amount;
        self
    }
    pub fn set_advance_payment(mut self, bp: Percent) -> Self {
        self.advance_payment = bp;
        self
    }
    pub fn set_retention(mut self, bp: Percent) -> Self {
        self.retention = bp;
        self
    }
    pub fn set_delay_damages(mut self, rate_bp: Percent, cap_bp: Percent) -> Self {
        self.delay_damages_rate = rate_bp;
        self.delay_damages_cap = cap_bp;
        self
    }
    pub fn set_time_for_completion(mut self, days: u32) -> Self {
        self.time_for_completion_days = days;
        self
    }
    pub fn set_commencement_date(mut self, date: TimeStamp) -> Self {
        self.commencement_date = Some(date);
        self
    }
    pub fn set_engineer(mut self, engineer_id: &str) -> Self {
        self.engineer_id = Some(engineer_id.to_string());
        self
    }
    pub fn contract_number(&self) -> &str {
        &self.contract_number
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contract_number.is_empty() {
            return Err(ValidationError::EmptyField("contract number"));
        }
        if self.title.is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        self.accepted_amount.validate("accepted contract amount")?;
        for (field, value) in [
            ("advance payment", self.advance_payment),
            ("retention", self.retention),
            ("delay damages rate", self.delay_damages_rate),
            ("delay damages cap", self.delay_damages_cap),
        ] {
            if value > MAX_BASIS_POINTS {
                return Err(ValidationError::PercentOutOfRange { field, value });
            }
        }
        Ok(())
    }

    /// Validates the draft and turns it into a `draft` contract record.
    pub fn finalise(self, id: String, owner_id: &str, now: TimeStamp) -> Result<Contract, ValidationError> {
        self.validate()?;
        Ok(Contract {
            id,
            contract_number: self.contract_number,
            title: self.title,
            accepted_amount: self.accepted_amount,
            advance_payment: self.advance_payment,
            retention: self.retention,
            delay_damages_rate: self.delay_damages_rate,
            delay_damages_cap: self.delay_damages_cap,
            time_for_completion_days: self.time_for_completion_days,
            commencement_date: self.commencement_date,
            status: ContractStatus::Draft,
            owner_id: owner_id.to_string(),
            engineer_id: self.engineer_id,
            created_at: now,
        })
    }
}

impl Contract {
    /// `draft → active → completed`, or `draft | active → terminated`.
    pub fn change_status(&mut self, to: ContractStatus) -> EngineResult<()> {
        use ContractStatus::*;
        let allowed = matches!(
            (self.status, to),
            (Draft, Active) | (Active, Completed) | (Draft, Terminated) | (Active, Terminated)
        );
        if !allowed {
            return Err(EngineError::invalid_state(
                &self.id,
                self.status,
                Action::ChangeContractStatus,
            ));
        }
        self.status = to;
        Ok(())
    }

    /// Retention held on a payment of `gross`, rounded toward zero.
    pub fn retention_on(&self, gross: Money) -> Result<Money, ValidationError> {
        basis_points_of(gross, self.retention, "retention")
    }

    /// Upper bound on delay damages for this contract.
    pub fn delay_damages_limit(&self) -> Result<Money, ValidationError> {
        basis_points_of(self.accepted_amount, self.delay_damages_cap, "delay_damages_cap")
    }
}

fn basis_points_of(amount: Money, rate: Percent, field: &'static str) -> Result<Money, ValidationError> {
    let share = i128::from(amount.0) * i128::from(rate) / i128::from(MAX_BASIS_POINTS);
    i64::try_from(share)
        .map(Money)
        .map_err(|_| ValidationError::AmountOutOfRange(field))
}
