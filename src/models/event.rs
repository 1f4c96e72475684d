use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    Customer,
    /// Reserved. Driver notifications are switched off until the driver
    /// messaging path is re-enabled.
    Driver,
}

impl RecipientType {
    pub fn is_enabled(&self) -> bool {
        matches!(self, RecipientType::Customer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    ReceivablesChange,
    PaymentReceived,
    CylinderReturn,
    OverdueReminder,
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::ReceivablesChange => "RECEIVABLES_CHANGE",
            TriggerType::PaymentReceived => "PAYMENT_RECEIVED",
            TriggerType::CylinderReturn => "CYLINDER_RETURN",
            TriggerType::OverdueReminder => "OVERDUE_REMINDER",
            TriggerType::Manual => "MANUAL",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "RECEIVABLES_CHANGE" => Some(TriggerType::ReceivablesChange),
            "PAYMENT_RECEIVED" => Some(TriggerType::PaymentReceived),
            "CYLINDER_RETURN" => Some(TriggerType::CylinderReturn),
            "OVERDUE_REMINDER" => Some(TriggerType::OverdueReminder),
            "MANUAL" => Some(TriggerType::Manual),
            _ => None,
        }
    }

    /// Triggers whose notification only makes sense above the materiality threshold.
    pub fn is_change_magnitude(&self) -> bool {
        matches!(self, TriggerType::ReceivablesChange)
    }
}

/// A business occurrence that may warrant an outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: String,
    pub tenant_id: String,
    pub recipient_type: RecipientType,
    pub recipient_id: String,
    pub recipient_phone: String,
    pub recipient_name: String,
    pub trigger_type: TriggerType,

    #[serde(default)]
    pub variables: HashMap<String, String>,

    #[serde(default = "default_language")]
    pub language: String,

    /// Magnitude of the monitored change, for change-magnitude triggers.
    #[serde(default)]
    pub change_amount: Option<f64>,
}

fn default_language() -> String {
    "en".to_string()
}

impl TriggerEvent {
    pub fn new(
        event_id: impl Into<String>,
        tenant_id: impl Into<String>,
        recipient_id: impl Into<String>,
        recipient_phone: impl Into<String>,
        recipient_name: impl Into<String>,
        trigger_type: TriggerType,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            tenant_id: tenant_id.into(),
            recipient_type: RecipientType::Customer,
            recipient_id: recipient_id.into(),
            recipient_phone: recipient_phone.into(),
            recipient_name: recipient_name.into(),
            trigger_type,
            variables: HashMap::new(),
            language: default_language(),
            change_amount: None,
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_change_amount(mut self, amount: f64) -> Self {
        self.change_amount = Some(amount);
        self
    }

    pub fn with_recipient_type(mut self, recipient_type: RecipientType) -> Self {
        self.recipient_type = recipient_type;
        self
    }

    /// Key identifying one business event for one recipient. Repeated
    /// processing of the same key always lands on the same delivery record.
    pub fn correlation_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.tenant_id,
            self.recipient_id,
            self.trigger_type.as_str(),
            self.event_id
        )
    }
}
