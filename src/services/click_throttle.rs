//! Ограничение частоты кликов по местам на стороне клиента.
//!
//! Работает до любого сетевого вызова: отсекает двойные клики по одному месту
//! и "автокликер" по всей карте. Состояние живёт только в процессе.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ThrottleConfig;
use crate::models::SeatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStats {
    pub clicks_in_window: usize,
    pub max_clicks: usize,
    pub tracked_seats: usize,
    pub blocked_seats: usize,
}

#[derive(Debug)]
pub struct ClickThrottle {
    max_clicks: usize,
    window: Duration,
    min_click_delay: Duration,
    cooldown: Duration,
    /// Моменты кликов внутри окна, не длиннее `max_clicks`.
    history: VecDeque<Instant>,
    last_click: HashMap<SeatId, Instant>,
    blocked_until: HashMap<SeatId, Instant>,
}

impl ClickThrottle {
    pub fn new(config: &ThrottleConfig) -> Self {
        let max_clicks = config.max_clicks.max(1);
        Self {
            max_clicks,
            window: config.window(),
            min_click_delay: config.min_click_delay(),
            cooldown: config.cooldown(),
            history: VecDeque::with_capacity(max_clicks),
            last_click: HashMap::new(),
            blocked_until: HashMap::new(),
        }
    }

    pub fn can_click(&mut self, seat_id: &SeatId) -> bool {
        self.wait_time(seat_id).is_zero()
    }

    /// Сколько ещё ждать до разрешённого клика. Ноль — можно сейчас.
    pub fn wait_time(&mut self, seat_id: &SeatId) -> Duration {
        let now = Instant::now();
        self.prune(now);

        let mut until = now;
        if self.history.len() >= self.max_clicks {
            if let Some(oldest) = self.history.front() {
                until = until.max(*oldest + self.window);
            }
        }
        if let Some(last) = self.last_click.get(seat_id) {
            until = until.max(*last + self.min_click_delay);
        }
        if let Some(blocked) = self.blocked_until.get(seat_id) {
            until = until.max(*blocked);
        }
        until.saturating_duration_since(now)
    }

    pub fn register_click(&mut self, seat_id: &SeatId) {
        let now = Instant::now();
        self.prune(now);

        self.history.push_back(now);
        while self.history.len() > self.max_clicks {
            self.history.pop_front();
        }
        self.last_click.insert(seat_id.clone(), now);
        self.blocked_until.insert(seat_id.clone(), now + self.cooldown);
        debug!("Click on seat {} registered ({} in window)", seat_id, self.history.len());
    }

    pub fn clear_seat(&mut self, seat_id: &SeatId) {
        self.last_click.remove(seat_id);
        self.blocked_until.remove(seat_id);
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_click.clear();
        self.blocked_until.clear();
    }

    pub fn stats(&mut self) -> ThrottleStats {
        self.prune(Instant::now());
        ThrottleStats {
            clicks_in_window: self.history.len(),
            max_clicks: self.max_clicks,
            tracked_seats: self.last_click.len(),
            blocked_seats: self.blocked_until.len(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.history.front() {
            if *oldest + self.window <= now {
                self.history.pop_front();
            } else {
                break;
            }
        }
        let delay = self.min_click_delay;
        self.last_click.retain(|_, at| *at + delay > now);
        self.blocked_until.retain(|_, until| *until > now);
    }
}
