//! Hotel search wizard driven through the conversation machine.

mod common;

use std::time::Duration;

use common::{day, Harness};
use wayfarer::bot::event::choice;
use wayfarer::bot::{Directive, Event, Step};
use wayfarer::hotels::{SearchError, SearchSort};
use wayfarer::storage::HistoryStore;

const USER: u64 = 10;

async fn send(h: &Harness, event: Event) -> Vec<Directive> {
    h.machine.handle(USER, event).await
}

async fn text(h: &Harness, s: &str) -> Vec<Directive> {
    send(h, Event::from_text(s)).await
}

async fn pick(h: &Harness, data: &str) -> Vec<Directive> {
    send(h, Event::choice(data)).await
}

/// Walk from the search command up to the result-count question.
async fn through_dates(h: &Harness, command: &str) {
    text(h, command).await;
    let offered = text(h, "Paris").await;
    let Some(Directive::Prompt { options, .. }) = offered.first() else {
        panic!("expected city candidates, got {:?}", offered);
    };
    assert_eq!(options.len(), 3);
    assert_eq!(options[2].data, choice::CITY_AGAIN);

    pick(h, "2734").await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardCheckIn);
    send(h, Event::Date(day(12))).await;
    pick(h, choice::DATE_CONFIRM).await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardCheckOut);
    send(h, Event::Date(day(15))).await;
    assert!(!common::has_error(&pick(h, choice::DATE_CONFIRM).await));
}

#[tokio::test]
async fn lowprice_flow_returns_listings_and_records_history() {
    let h = common::harness(common::FakeHotels::returning(vec![
        common::listing("1", "Budget Inn", 40.0),
        common::listing("2", "Hostel Nord", 25.0),
        common::listing("3", "Rive Gauche", 90.0),
        common::listing("4", "Extra", 99.0),
    ]));
    through_dates(&h, "/lowprice").await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardResultCount);

    let out = text(&h, "11").await;
    assert!(common::has_error(&out));
    assert_eq!(h.machine.step_of(USER).await, Step::WizardResultCount);

    text(&h, "3").await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardPhotoCount);
    assert!(common::has_error(&pick(&h, "7").await));

    let out = pick(&h, "2").await;
    let Some(Directive::ResultList {
        listings, nights, ..
    }) = out.first()
    else {
        panic!("expected results, got {:?}", out);
    };
    assert_eq!(listings.len(), 3);
    assert_eq!(*nights, 3);
    assert_eq!(h.machine.step_of(USER).await, Step::Idle);

    let criteria = h.hotels.last_call().unwrap();
    assert_eq!(criteria.sort, SearchSort::LowPrice);
    assert_eq!(criteria.city.region_id, "2734");
    assert_eq!(criteria.result_count, 3);
    assert_eq!(criteria.photo_count, 2);
    assert_eq!(criteria.min_price, None);

    let history = h.store.recent_searches(USER, 5).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].city, "Paris, France");
    assert_eq!(history[0].hotels.len(), 3);

    let shown = common::all_text(&text(&h, "/history").await);
    assert!(shown.contains("Budget Inn"));
}

#[tokio::test]
async fn check_out_must_follow_check_in() {
    let h = common::harness(common::FakeHotels::returning(vec![]));
    text(&h, "/highprice").await;
    text(&h, "rome").await;
    pick(&h, "3023").await;
    send(&h, Event::Date(day(20))).await;
    pick(&h, choice::DATE_CONFIRM).await;
    send(&h, Event::Date(day(18))).await;

    let out = pick(&h, choice::DATE_CONFIRM).await;
    assert!(common::has_error(&out));
    assert!(common::all_text(&out).contains("after the check-in"));
    assert_eq!(h.machine.step_of(USER).await, Step::WizardDateConfirm);

    pick(&h, choice::DATE_CHANGE).await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardCheckOut);
    send(&h, Event::Date(day(21))).await;
    pick(&h, choice::DATE_CONFIRM).await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardResultCount);
}

#[tokio::test]
async fn bestdeal_asks_for_a_minimum_price() {
    let h = common::harness(common::FakeHotels::returning(vec![common::listing(
        "5", "Central", 120.0,
    )]));
    through_dates(&h, "/bestdeal").await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardMinPrice);

    assert!(common::has_error(&text(&h, "cheap").await));
    assert_eq!(h.machine.step_of(USER).await, Step::WizardMinPrice);
    text(&h, "50").await;
    text(&h, "1").await;
    pick(&h, "0").await;

    let criteria = h.hotels.last_call().unwrap();
    assert_eq!(criteria.sort, SearchSort::BestDeal);
    assert_eq!(criteria.min_price, Some(50));
    assert_eq!(criteria.photo_count, 0);
}

#[tokio::test]
async fn none_of_these_returns_to_the_city_question() {
    let h = common::harness(common::FakeHotels::returning(vec![]));
    text(&h, "/lowprice").await;
    text(&h, "Paris").await;
    pick(&h, choice::CITY_AGAIN).await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardCity);

    let out = text(&h, "Atlantis").await;
    assert!(common::has_error(&out));
    assert_eq!(h.machine.step_of(USER).await, Step::WizardCity);
}

#[tokio::test]
async fn not_found_and_unreachable_are_reported_differently() {
    let missing = common::harness(common::FakeHotels::failing(SearchError::NotFound));
    through_dates(&missing, "/lowprice").await;
    text(&missing, "5").await;
    let out = pick(&missing, "0").await;
    let not_found = common::all_text(&out);
    assert!(not_found.contains("Nothing was found"));
    assert_eq!(missing.machine.step_of(USER).await, Step::Idle);
    let history = missing.store.recent_searches(USER, 5).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].hotels.is_empty());

    let down = common::harness(common::FakeHotels::failing(SearchError::Unreachable(
        "503".into(),
    )));
    through_dates(&down, "/lowprice").await;
    text(&down, "5").await;
    let out = pick(&down, "0").await;
    let unreachable = common::all_text(&out);
    assert!(unreachable.contains("not answering"));
    assert_ne!(not_found, unreachable);
    assert_eq!(down.machine.step_of(USER).await, Step::Idle);
}

#[tokio::test]
async fn slow_search_is_bounded_by_the_timeout() {
    let h = common::harness(common::FakeHotels::slow(Duration::from_secs(5)));
    through_dates(&h, "/lowprice").await;
    text(&h, "1").await;

    let started = std::time::Instant::now();
    let out = pick(&h, "0").await;
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(common::all_text(&out).contains("not answering"));
    assert_eq!(h.hotels.call_count(), 1);
    assert_eq!(h.machine.step_of(USER).await, Step::Idle);
}

#[tokio::test]
async fn unreachable_lookup_resets_the_wizard() {
    let h = common::harness(common::FakeHotels::returning(vec![]));
    text(&h, "/lowprice").await;
    let out = text(&h, "offline").await;
    assert!(common::has_error(&out));
    assert_eq!(h.machine.step_of(USER).await, Step::Idle);

    // a fresh search can start right away
    text(&h, "/lowprice").await;
    assert_eq!(h.machine.step_of(USER).await, Step::WizardCity);
}
