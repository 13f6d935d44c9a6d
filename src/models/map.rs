//! Элементы карты зала.
//!
//! Документ карты рисуется редактором и не имеет строгой схемы: столы со
//! списками стульев, отдельные стулья, фон, подписи, линии. Здесь он явно
//! раскладывается в `MapElement`, а уже потом из этого строятся места.

use serde_json::Value;

use super::{BaseStatus, ZoneRef};

/// Префиксы id декоративных элементов редактора.
const DECORATION_PREFIXES: [&str; 6] = ["bg_", "txt_", "shape_", "line_", "rect_", "circle_"];

const SEAT_TYPES: [&str; 3] = ["silla", "asiento", "seat"];
const SHAPE_SEAT_TYPES: [&str; 2] = ["circle", "rect"];

pub const DEFAULT_SEAT_SIZE: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub enum MapElement {
    Table(TableElement),
    Seat(SeatElement),
    Decoration(DecorationKind),
    /// Не распознан, но есть id и координаты.
    Unknown(SeatElement),
    /// Нет id или координат — пропускаем без шума.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationKind {
    Background,
    Text,
    Line,
    Shape,
    Image,
    /// Стол без стульев.
    EmptyTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableElement {
    pub id: String,
    pub name: Option<String>,
    pub zone: Option<ZoneRef>,
    pub seats: Vec<SeatElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeatElement {
    pub id: Option<String>,
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub zone: Option<ZoneRef>,
    pub price: Option<f64>,
    pub status: BaseStatus,
}

impl MapElement {
    /// Явно определяет вид элемента. Порядок проверок важен:
    /// стол → место → декорация → неизвестный.
    pub fn decode(value: &Value) -> MapElement {
        let id = string_field(value, "_id").or_else(|| string_field(value, "id"));
        let kind = string_field(value, "type").map(|t| t.to_ascii_lowercase());

        if let Some(id) = &id {
            let members = seat_members(value);
            if !members.is_empty() {
                return MapElement::Table(TableElement {
                    id: id.clone(),
                    name: string_field(value, "nombre").or_else(|| string_field(value, "name")),
                    zone: zone_field(value),
                    seats: members.iter().map(SeatElement::decode).collect(),
                });
            }

            if let Some(kind) = kind.as_deref() {
                if SEAT_TYPES.contains(&kind)
                    || (SHAPE_SEAT_TYPES.contains(&kind) && has_seat_fields(value))
                {
                    return MapElement::Seat(SeatElement::decode(value));
                }
            }
        }

        if let Some(decoration) = decoration_kind(id.as_deref(), kind.as_deref()) {
            return MapElement::Decoration(decoration);
        }

        if id.is_some() && has_coordinates(value) {
            return MapElement::Unknown(SeatElement::decode(value));
        }

        MapElement::Ignored
    }
}

impl SeatElement {
    pub fn decode(value: &Value) -> SeatElement {
        let (x, y) = position(value);
        SeatElement {
            id: string_field(value, "_id").or_else(|| string_field(value, "id")),
            name: string_field(value, "nombre")
                .or_else(|| string_field(value, "numero"))
                .or_else(|| string_field(value, "name")),
            x,
            y,
            width: number_field(value, "width")
                .or_else(|| number_field(value, "ancho"))
                .unwrap_or(DEFAULT_SEAT_SIZE),
            height: number_field(value, "height")
                .or_else(|| number_field(value, "alto"))
                .unwrap_or(DEFAULT_SEAT_SIZE),
            zone: zone_field(value),
            price: number_field(value, "precio").or_else(|| number_field(value, "price")),
            status: string_field(value, "estado")
                .or_else(|| string_field(value, "status"))
                .map(|s| BaseStatus::from_label(&s))
                .unwrap_or_default(),
        }
    }
}

fn decoration_kind(id: Option<&str>, kind: Option<&str>) -> Option<DecorationKind> {
    match kind {
        Some("background") => return Some(DecorationKind::Background),
        Some("text") => return Some(DecorationKind::Text),
        Some("line") => return Some(DecorationKind::Line),
        Some("shape") => return Some(DecorationKind::Shape),
        Some("image") => return Some(DecorationKind::Image),
        Some("mesa") | Some("table") => return Some(DecorationKind::EmptyTable),
        _ => {}
    }

    let id = id?;
    DECORATION_PREFIXES
        .iter()
        .find(|prefix| id.starts_with(*prefix))
        .map(|prefix| match *prefix {
            "bg_" => DecorationKind::Background,
            "txt_" => DecorationKind::Text,
            "line_" => DecorationKind::Line,
            _ => DecorationKind::Shape,
        })
}

fn seat_members(value: &Value) -> &[Value] {
    for key in ["sillas", "asientos", "seats"] {
        if let Some(items) = value.get(key).and_then(Value::as_array) {
            if !items.is_empty() {
                return items;
            }
        }
    }
    &[]
}

fn has_seat_fields(value: &Value) -> bool {
    ["nombre", "numero", "estado", "zona"]
        .iter()
        .any(|key| value.get(key).is_some_and(|v| !v.is_null()))
}

fn has_coordinates(value: &Value) -> bool {
    value.get("posicion").is_some_and(Value::is_object)
        || number_field(value, "x").is_some()
        || number_field(value, "y").is_some()
}

fn position(value: &Value) -> (f64, f64) {
    let pos = value.get("posicion");
    let coord = |key: &str| {
        pos.and_then(|p| number_field(p, key))
            .or_else(|| number_field(value, key))
            .unwrap_or(0.0)
    };
    (coord("x"), coord("y"))
}

/// Строки и числа одинаково годятся как id/название (редактор пишет и то, и другое).
fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// `zona` бывает строкой-id или объектом `{id|_id, nombre, color}`.
fn zone_field(value: &Value) -> Option<ZoneRef> {
    let zone = value.get("zona").or_else(|| value.get("zone"))?;
    match zone {
        Value::String(s) if !s.trim().is_empty() => Some(ZoneRef::new(s.trim())),
        Value::Number(n) => Some(ZoneRef::new(n.to_string())),
        Value::Object(_) => {
            let id = string_field(zone, "id").or_else(|| string_field(zone, "_id"))?;
            Some(ZoneRef {
                id,
                name: string_field(zone, "nombre").or_else(|| string_field(zone, "name")),
                color: string_field(zone, "color"),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_with_chairs_is_a_table() {
        let el = json!({"_id": "mesa_1", "type": "mesa", "zona": "z1",
            "sillas": [{"_id": "s1", "x": 1, "y": 2}]});
        match MapElement::decode(&el) {
            MapElement::Table(t) => {
                assert_eq!(t.id, "mesa_1");
                assert_eq!(t.zone, Some(ZoneRef::new("z1")));
                assert_eq!(t.seats.len(), 1);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn table_without_chairs_is_decoration() {
        let el = json!({"_id": "mesa_2", "type": "mesa", "sillas": []});
        assert_eq!(MapElement::decode(&el), MapElement::Decoration(DecorationKind::EmptyTable));
    }

    #[test]
    fn circle_needs_seat_fields() {
        let seat = json!({"_id": "c1", "type": "circle", "nombre": "A1", "x": 10, "y": 10});
        assert!(matches!(MapElement::decode(&seat), MapElement::Seat(_)));

        let plain = json!({"_id": "circle_9", "type": "circle", "x": 10, "y": 10});
        assert_eq!(MapElement::decode(&plain), MapElement::Decoration(DecorationKind::Shape));
    }

    #[test]
    fn decorations_by_type_and_prefix() {
        assert_eq!(
            MapElement::decode(&json!({"_id": "x", "type": "background"})),
            MapElement::Decoration(DecorationKind::Background)
        );
        assert_eq!(
            MapElement::decode(&json!({"_id": "txt_title", "x": 5, "y": 5})),
            MapElement::Decoration(DecorationKind::Text)
        );
    }

    #[test]
    fn unknown_and_ignored() {
        let unknown = json!({"_id": "weird", "posicion": {"x": 3, "y": 450}});
        match MapElement::decode(&unknown) {
            MapElement::Unknown(seat) => assert_eq!((seat.x, seat.y), (3.0, 450.0)),
            other => panic!("expected unknown, got {:?}", other),
        }
        assert_eq!(MapElement::decode(&json!({"foo": 1})), MapElement::Ignored);
        assert_eq!(MapElement::decode(&json!({"_id": "no_coords"})), MapElement::Ignored);
    }

    #[test]
    fn zone_object_and_string_status() {
        let el = json!({"_id": "s1", "type": "silla", "estado": "vendido", "precio": "12.5",
            "zona": {"_id": "vip", "nombre": "VIP", "color": "#FFD700"}});
        match MapElement::decode(&el) {
            MapElement::Seat(seat) => {
                assert_eq!(seat.status, BaseStatus::Sold);
                assert_eq!(seat.price, Some(12.5));
                let zone = seat.zone.unwrap();
                assert_eq!(zone.id, "vip");
                assert_eq!(zone.name.as_deref(), Some("VIP"));
            }
            other => panic!("expected seat, got {:?}", other),
        }
    }
}
