//! Week grid for the admin calendar page.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::BookingRow;

pub const ROW_MINUTES: i64 = 30;

#[derive(Clone, Debug, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub status: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_range: String,
}

impl CalendarEvent {
    /// Skips rows whose stored times can no longer be parsed.
    pub fn from_row(row: &BookingRow) -> Option<Self> {
        let start = row.start()?;
        let end = row.end()?;
        let customer = row.customer_name.as_deref().unwrap_or("Walk-in");
        let title = match row.service_name.as_deref() {
            Some(service) => format!("{customer} · {service}"),
            None => customer.to_string(),
        };
        Some(Self {
            id: row.id.clone(),
            title,
            status: row.status.clone(),
            start,
            end,
            time_range: format!("{}–{}", start.format("%H:%M"), end.format("%H:%M")),
        })
    }
}

#[derive(Clone, Debug)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub label: String,
    pub is_today: bool,
}

#[derive(Clone, Debug)]
pub struct CalendarRow {
    pub label: String,
    pub cells: Vec<Vec<CalendarEvent>>,
}

#[derive(Clone, Debug)]
pub struct WeekCalendar {
    pub week_start: NaiveDate,
    pub days: Vec<CalendarDay>,
    pub rows: Vec<CalendarRow>,
    /// Events that start outside the visible hours.
    pub outside: Vec<CalendarEvent>,
}

impl WeekCalendar {
    pub fn week_end(&self) -> NaiveDate {
        self.week_start + Duration::days(7)
    }

    pub fn prev_week(&self) -> NaiveDate {
        self.week_start - Duration::days(7)
    }

    pub fn next_week(&self) -> NaiveDate {
        self.week_end()
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn build_week(
    week_start: NaiveDate,
    today: NaiveDate,
    events: Vec<CalendarEvent>,
    (open, close): (NaiveTime, NaiveTime),
) -> WeekCalendar {
    let days: Vec<CalendarDay> = (0..7)
        .map(|offset| {
            let date = week_start + Duration::days(offset);
            CalendarDay {
                date,
                label: date.format("%a %d %b").to_string(),
                is_today: date == today,
            }
        })
        .collect();

    let mut starts = Vec::new();
    let mut time = open;
    while time < close {
        starts.push(time);
        let (next, wrapped) = time.overflowing_add_signed(Duration::minutes(ROW_MINUTES));
        if wrapped != 0 {
            break;
        }
        time = next;
    }

    let mut rows: Vec<CalendarRow> = starts
        .iter()
        .map(|start| CalendarRow {
            label: start.format("%H:%M").to_string(),
            cells: vec![Vec::new(); 7],
        })
        .collect();

    let mut outside = Vec::new();
    for event in events {
        let day = (event.start.date() - week_start).num_days();
        if !(0..7).contains(&day) {
            continue;
        }
        let row = starts.iter().rposition(|start| *start <= event.start.time());
        match row {
            Some(row) if event.start.time() < close => rows[row].cells[day as usize].push(event),
            _ => outside.push(event),
        }
    }

    WeekCalendar {
        week_start,
        days,
        rows,
        outside,
    }
}
