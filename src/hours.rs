//! Weekly operating hours, stored as a JSON string under the `operating_hours` setting.

use std::collections::HashMap;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub const DAY_KEYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

pub const DEFAULT_WINDOW_START: &str = "08:00";
pub const DEFAULT_WINDOW_END: &str = "20:00";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayHours {
    pub is_open: bool,
    pub start: String,
    pub end: String,
}

impl DayHours {
    fn open(start: &str, end: &str) -> Self {
        Self {
            is_open: true,
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    fn closed() -> Self {
        Self {
            is_open: false,
            start: "09:00".to_string(),
            end: "17:00".to_string(),
        }
    }

    /// Opening and closing time when the day is open and both times parse.
    pub fn span(&self) -> Option<(NaiveTime, NaiveTime)> {
        if !self.is_open {
            return None;
        }
        let start = parse_clock(&self.start)?;
        let end = parse_clock(&self.end)?;
        (start < end).then_some((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub monday: DayHours,
    pub tuesday: DayHours,
    pub wednesday: DayHours,
    pub thursday: DayHours,
    pub friday: DayHours,
    pub saturday: DayHours,
    pub sunday: DayHours,
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self {
            monday: DayHours::open("09:00", "18:00"),
            tuesday: DayHours::open("09:00", "18:00"),
            wednesday: DayHours::open("09:00", "18:00"),
            thursday: DayHours::open("09:00", "18:00"),
            friday: DayHours::open("09:00", "18:00"),
            saturday: DayHours::open("09:00", "14:00"),
            sunday: DayHours::closed(),
        }
    }
}

impl OperatingHours {
    pub fn parse(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    pub fn to_setting_value(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a stored value, falling back to the default week.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(Self::parse) {
            Some(Ok(hours)) => hours,
            Some(Err(err)) => {
                log::warn!("Unparsable operating hours setting, using defaults: {err}");
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn for_weekday(&self, weekday: Weekday) -> &DayHours {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    fn day_mut(&mut self, key: &str) -> Option<&mut DayHours> {
        match key {
            "monday" => Some(&mut self.monday),
            "tuesday" => Some(&mut self.tuesday),
            "wednesday" => Some(&mut self.wednesday),
            "thursday" => Some(&mut self.thursday),
            "friday" => Some(&mut self.friday),
            "saturday" => Some(&mut self.saturday),
            "sunday" => Some(&mut self.sunday),
            _ => None,
        }
    }

    pub fn days(&self) -> [(&'static str, &DayHours); 7] {
        [
            (DAY_KEYS[0], &self.monday),
            (DAY_KEYS[1], &self.tuesday),
            (DAY_KEYS[2], &self.wednesday),
            (DAY_KEYS[3], &self.thursday),
            (DAY_KEYS[4], &self.friday),
            (DAY_KEYS[5], &self.saturday),
            (DAY_KEYS[6], &self.sunday),
        ]
    }

    /// Builds the week from the settings form: `<day>_open`, `<day>_start`, `<day>_end`.
    /// Unchecked checkboxes are simply absent from the form.
    pub fn from_form(fields: &HashMap<String, String>) -> Result<Self, Vec<String>> {
        let mut hours = Self::default();
        let mut errors = Vec::new();
        for key in DAY_KEYS {
            let is_open = fields.contains_key(&format!("{key}_open"));
            let start = fields
                .get(&format!("{key}_start"))
                .map(|value| value.trim().to_string())
                .unwrap_or_default();
            let end = fields
                .get(&format!("{key}_end"))
                .map(|value| value.trim().to_string())
                .unwrap_or_default();

            if is_open {
                match (parse_clock(&start), parse_clock(&end)) {
                    (Some(open), Some(close)) if open < close => {}
                    (Some(_), Some(_)) => {
                        errors.push(format!("{}: closing time must be after opening time.", title_case(key)))
                    }
                    _ => errors.push(format!("{}: use HH:MM for opening and closing times.", title_case(key))),
                }
            }

            if let Some(day) = hours.day_mut(key) {
                day.is_open = is_open;
                if !start.is_empty() {
                    day.start = start;
                }
                if !end.is_empty() {
                    day.end = end;
                }
            }
        }

        if errors.is_empty() {
            Ok(hours)
        } else {
            Err(errors)
        }
    }
}

/// Visible calendar window: earliest opening to latest closing across open days.
pub fn calendar_window(value: Option<&str>) -> (NaiveTime, NaiveTime) {
    let fallback = default_window();
    let Some(hours) = value.and_then(|value| OperatingHours::parse(value).ok()) else {
        return fallback;
    };

    let spans: Vec<_> = hours.days().iter().filter_map(|(_, day)| day.span()).collect();
    let start = spans.iter().map(|(start, _)| *start).min();
    let end = spans.iter().map(|(_, end)| *end).max();
    match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => fallback,
    }
}

fn default_window() -> (NaiveTime, NaiveTime) {
    (
        parse_clock(DEFAULT_WINDOW_START).unwrap_or(NaiveTime::MIN),
        parse_clock(DEFAULT_WINDOW_END).unwrap_or(NaiveTime::MIN),
    )
}

pub fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

pub fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(value: &str) -> NaiveTime {
        parse_clock(value).unwrap()
    }

    #[test]
    fn serialized_week_parses_back_identically() {
        let mut hours = OperatingHours::default();
        hours.sunday = DayHours::open("10:00", "13:30");
        hours.wednesday.is_open = false;

        let stored = hours.to_setting_value().unwrap();
        let parsed = OperatingHours::parse(&stored).unwrap();

        assert_eq!(parsed, hours);
        for ((key, original), (_, restored)) in hours.days().iter().zip(parsed.days().iter()) {
            assert_eq!(original, restored, "{key} differs after round trip");
        }
    }

    #[test]
    fn stored_json_uses_camel_case_open_flag() {
        let stored = OperatingHours::default().to_setting_value().unwrap();
        assert!(stored.contains("\"isOpen\":true"));
        assert!(stored.contains("\"sunday\""));
    }

    #[test]
    fn calendar_window_spans_open_days() {
        let mut hours = OperatingHours::default();
        hours.saturday = DayHours::open("07:30", "12:00");
        hours.friday = DayHours::open("09:00", "21:00");
        hours.sunday = DayHours {
            is_open: false,
            start: "05:00".to_string(),
            end: "23:00".to_string(),
        };
        let value = hours.to_setting_value().unwrap();

        assert_eq!(calendar_window(Some(&value)), (clock("07:30"), clock("21:00")));
    }

    #[test]
    fn calendar_window_falls_back_when_unusable() {
        let fallback = (clock("08:00"), clock("20:00"));
        assert_eq!(calendar_window(None), fallback);
        assert_eq!(calendar_window(Some("{not json")), fallback);

        let mut closed = OperatingHours::default();
        for key in DAY_KEYS {
            if let Some(day) = closed.day_mut(key) {
                day.is_open = false;
            }
        }
        let value = closed.to_setting_value().unwrap();
        assert_eq!(calendar_window(Some(&value)), fallback);
    }

    #[test]
    fn form_parsing_reads_seven_days() {
        let mut fields = HashMap::new();
        for key in DAY_KEYS {
            fields.insert(format!("{key}_start"), "10:00".to_string());
            fields.insert(format!("{key}_end"), "16:00".to_string());
        }
        fields.insert("monday_open".to_string(), "on".to_string());
        fields.insert("tuesday_open".to_string(), "on".to_string());

        let hours = OperatingHours::from_form(&fields).unwrap();
        assert!(hours.monday.is_open);
        assert!(hours.tuesday.is_open);
        assert!(!hours.sunday.is_open);
        assert_eq!(hours.monday.start, "10:00");
        assert_eq!(hours.friday.end, "16:00");
    }

    #[test]
    fn form_rejects_inverted_hours_on_open_days() {
        let mut fields = HashMap::new();
        fields.insert("monday_open".to_string(), "on".to_string());
        fields.insert("monday_start".to_string(), "18:00".to_string());
        fields.insert("monday_end".to_string(), "09:00".to_string());
        fields.insert("tuesday_open".to_string(), "on".to_string());
        fields.insert("tuesday_start".to_string(), "nine".to_string());
        fields.insert("tuesday_end".to_string(), "17:00".to_string());

        let errors = OperatingHours::from_form(&fields).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Monday"));
        assert!(errors[1].starts_with("Tuesday"));
    }
}
