//! Shared builders for unit tests.

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::{
    Actor, Booking, BookingStatus, Event, EventStatus, Resource, Role, Schedule,
};
use crate::window::{parse_datetime, TimeWindow};

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn at(s: &str) -> NaiveDateTime {
    parse_datetime(s).unwrap()
}

pub fn window(date: &str, start: &str, end: &str) -> TimeWindow {
    TimeWindow::on_day(day(date), start, end).unwrap()
}

pub fn resource_booking(
    id: &str,
    resource_id: &str,
    w: TimeWindow,
    status: BookingStatus,
) -> Booking {
    let mut b = Booking::for_resource(resource_id, &w);
    b.id = id.to_string();
    b.status = status;
    b.created_by = Some("member@example.com".to_string());
    b
}

pub fn event_booking(id: &str, event_id: &str, w: TimeWindow, status: BookingStatus) -> Booking {
    let mut b = Booking::for_event(event_id, &w);
    b.id = id.to_string();
    b.status = status;
    b.created_by = Some("member@example.com".to_string());
    b
}

pub fn event(id: &str, date: &str, start: &str, end: &str, resources: &[&str]) -> Event {
    Event {
        id: id.to_string(),
        title: format!("Event {}", id),
        description: None,
        category: Some("workshop".to_string()),
        schedule: Schedule::from_window(&window(date, start, end)),
        location: "Building A".to_string(),
        capacity: 20,
        registered_count: 0,
        ticket_price: 15.0,
        status: EventStatus::Active,
        assigned_resource_ids: resources.iter().map(|r| r.to_string()).collect(),
        series_id: None,
        is_recurring: false,
        recurrence_pattern: None,
        recurrence_end_date: None,
        image_url: None,
    }
}

pub fn resource(id: &str, name: &str) -> Resource {
    Resource {
        id: id.to_string(),
        name: name.to_string(),
        category: Some("Room".to_string()),
        description: None,
        capacity: 10,
        location: "Building A".to_string(),
        daily_price: 50.0,
        features: vec![],
        available: true,
        requires_approval: false,
        availability_status: None,
        image_url: None,
    }
}

pub fn admin() -> Actor {
    Actor {
        id: "admin-1".to_string(),
        email: "admin@example.com".to_string(),
        role: Role::Admin,
    }
}

pub fn member() -> Actor {
    Actor {
        id: "user-1".to_string(),
        email: "member@example.com".to_string(),
        role: Role::User,
    }
}
