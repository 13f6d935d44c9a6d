use serde::{Deserialize, Serialize};

use super::SeatId;

/// Базовый статус места, хранится независимо от блокировок.
/// Меняется только процессом продажи/аннулирования.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseStatus {
    #[default]
    Available,
    Sold,
    Reserved,
    Voided,
}

impl BaseStatus {
    /// Статусы в картах встречаются и на испанском, и на английском.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "vendido" | "sold" | "pagado" | "paid" => BaseStatus::Sold,
            "reservado" | "reserved" => BaseStatus::Reserved,
            "anulado" | "voided" | "void" => BaseStatus::Voided,
            _ => BaseStatus::Available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<String>,
}

impl ZoneRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            color: None,
        }
    }
}

/// Откуда место взялось при разборе карты.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatOrigin {
    Table,
    Standalone,
    /// Неопознанный элемент с координатами, принятый за место.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub table_id: Option<String>,
    pub table_name: Option<String>,
    pub zone: Option<ZoneRef>,
    pub price: Option<f64>,
    pub base_status: BaseStatus,
    pub origin: SeatOrigin,
}
