//! Извлечение мест из документа карты зала.
//!
//! Чистая функция: никакого I/O, один и тот же документ всегда даёт один и тот
//! же список мест в одном и том же порядке.

use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::models::{MapElement, Seat, SeatElement, SeatId, SeatOrigin, ZoneRef};

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Принимать неопознанные элементы с координатами за места.
    pub include_unknown: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { include_unknown: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapSeatExtractor {
    options: ExtractOptions,
}

impl MapSeatExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn classify(element: &Value) -> MapElement {
        MapElement::decode(element)
    }

    pub fn extract(&self, document: &Value) -> Vec<Seat> {
        let elements = top_level_elements(document);
        let mut seats = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mut push = |seat: Seat, seats: &mut Vec<Seat>| {
            if seen.insert(seat.id.as_str().to_string()) {
                seats.push(seat);
            } else {
                debug!("Duplicate seat id {} skipped", seat.id);
            }
        };

        for (index, element) in elements.iter().enumerate() {
            match Self::classify(element) {
                MapElement::Table(table) => {
                    let table_name = table.name.clone().unwrap_or_else(|| format!("Mesa {}", index + 1));
                    for member in table.seats {
                        let zone = member.zone.clone().or_else(|| table.zone.clone());
                        if let Some(seat) = build_seat(member, zone, SeatOrigin::Table) {
                            push(
                                Seat {
                                    table_id: Some(table.id.clone()),
                                    table_name: Some(table_name.clone()),
                                    ..seat
                                },
                                &mut seats,
                            );
                        }
                    }
                }
                MapElement::Seat(element) => {
                    let zone = element.zone.clone().unwrap_or_else(|| band_zone(element.y));
                    if let Some(seat) = build_seat(element, Some(zone), SeatOrigin::Standalone) {
                        push(seat, &mut seats);
                    }
                }
                MapElement::Unknown(element) => {
                    warn!(
                        "Unrecognized map element {:?} at ({}, {})",
                        element.id, element.x, element.y
                    );
                    if self.options.include_unknown {
                        let zone = element.zone.clone().unwrap_or_else(|| band_zone(element.y));
                        if let Some(seat) = build_seat(element, Some(zone), SeatOrigin::Inferred) {
                            push(seat, &mut seats);
                        }
                    }
                }
                MapElement::Decoration(_) | MapElement::Ignored => {}
            }
        }

        debug!("Extracted {} seats from {} map elements", seats.len(), elements.len());
        seats
    }
}

/// Зона по вертикальной полосе, если в карте она не указана.
pub fn band_zone(y: f64) -> ZoneRef {
    let (id, name, color) = if y < 200.0 {
        ("zona_vip", "Zona VIP", "#FFD700")
    } else if y < 400.0 {
        ("zona_premium", "Zona Premium", "#FF6B6B")
    } else {
        ("zona_general", "Zona General", "#4CAF50")
    };
    ZoneRef {
        id: id.to_string(),
        name: Some(name.to_string()),
        color: Some(color.to_string()),
    }
}

fn build_seat(element: SeatElement, zone: Option<ZoneRef>, origin: SeatOrigin) -> Option<Seat> {
    // стул стола без _id пропускаем
    let id = element.id?;
    Some(Seat {
        name: element.name.unwrap_or_else(|| id.clone()),
        id: SeatId::new(id),
        x: element.x,
        y: element.y,
        width: element.width,
        height: element.height,
        table_id: None,
        table_name: None,
        zone,
        price: element.price,
        base_status: element.status,
        origin,
    })
}

/// `{contenido: [...]}`, `{contenido: {elementos, mesas}}` или просто массив.
fn top_level_elements(document: &Value) -> Vec<&Value> {
    let content = document.get("contenido").unwrap_or(document);
    match content {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => ["elementos", "mesas"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_array))
            .flatten()
            .collect(),
        _ => {
            warn!("Map document has no element list");
            Vec::new()
        }
    }
}
