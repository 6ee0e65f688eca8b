//! Hotel search wizard.
//!
//! Collects city, check-in/check-out dates, an optional minimum price (best-deal only),
//! the number of results and the number of photos, one step at a time. Every step either
//! accepts the event and moves on or returns an error without touching the draft, so a
//! re-prompt always starts from the same state. The finished draft is handed back as a
//! [`SearchCriteria`]; running the search is the caller's job.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use super::event::{choice, ChoiceOption, Directive, Event};
use super::session::{ConversationState, Step};
use crate::config::SearchConfig;
use crate::errors::{BotError, StateConflict};
use crate::hotels::{bounded, CityCandidate, CityLookup, SearchCriteria, SearchSort};

/// Upper bound on the number of listings a search may ask for.
pub const MAX_RESULT_COUNT: u8 = 10;

/// Which date the date-confirm step is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    CheckIn,
    CheckOut,
}

/// Fields collected so far by the search wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDraft {
    pub sort: SearchSort,
    pub candidates: Vec<CityCandidate>,
    pub city: Option<CityCandidate>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub confirming: Option<DateField>,
    pub min_price: Option<u32>,
    pub result_count: Option<u8>,
}

impl SearchDraft {
    pub fn new(sort: SearchSort) -> Self {
        Self {
            sort,
            candidates: Vec::new(),
            city: None,
            check_in: None,
            check_out: None,
            confirming: None,
            min_price: None,
            result_count: None,
        }
    }
}

/// Result of feeding one event to the wizard.
#[derive(Debug, Clone, PartialEq)]
pub enum WizardOutcome {
    Continue(Vec<Directive>),
    Complete(SearchCriteria),
}

pub struct SearchWizard {
    lookup: Arc<dyn CityLookup>,
    photo_choices: Vec<u8>,
    max_results: u8,
    lookup_timeout: Duration,
}

fn format_date(d: NaiveDate) -> String {
    d.format("%d.%m.%Y").to_string()
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T, BotError> {
    text.trim()
        .parse::<T>()
        .map_err(|_| BotError::validation(format!("{} must be a whole number", what)))
}

impl SearchWizard {
    pub fn new(lookup: Arc<dyn CityLookup>, config: &SearchConfig) -> Self {
        let mut photo_choices = config.photo_choices.clone();
        if photo_choices.is_empty() {
            photo_choices.push(0);
        }
        Self {
            lookup,
            photo_choices,
            max_results: config.max_results.clamp(1, MAX_RESULT_COUNT),
            lookup_timeout: Duration::from_secs(config.timeout_seconds.max(1) as u64),
        }
    }

    pub fn max_results(&self) -> u8 {
        self.max_results
    }

    /// Enter the wizard at the city step.
    pub fn begin(&self, state: &mut ConversationState, sort: SearchSort) -> Vec<Directive> {
        state.draft = Some(SearchDraft::new(sort));
        state.step = Step::WizardCity;
        vec![
            Directive::Confirmation(format!("Searching for {}.", sort.describe())),
            city_prompt(),
        ]
    }

    /// Feed one event to the step the conversation is on.
    pub async fn advance(
        &self,
        state: &mut ConversationState,
        event: &Event,
        today: NaiveDate,
    ) -> Result<WizardOutcome, BotError> {
        let step = state.step;
        let Some(draft) = state.draft.as_mut() else {
            return Err(StateConflict::UnexpectedEvent { step: step.name() }.into());
        };

        match (step, event) {
            (Step::WizardCity, Event::Text(text)) => {
                let name = text.trim();
                if name.is_empty() {
                    return Err(BotError::validation("type the name of a city"));
                }
                let candidates =
                    bounded(self.lookup_timeout, self.lookup.lookup_city(name)).await?;
                if candidates.is_empty() {
                    return Err(BotError::validation(format!(
                        "no city called \"{}\" was found, try again",
                        name
                    )));
                }
                let mut options: Vec<ChoiceOption> = candidates
                    .iter()
                    .map(|c| ChoiceOption::new(c.name.clone(), c.region_id.clone()))
                    .collect();
                options.push(ChoiceOption::new("None of these", choice::CITY_AGAIN));
                draft.candidates = candidates;
                state.step = Step::WizardCityConfirm;
                Ok(WizardOutcome::Continue(vec![Directive::prompt_with(
                    "Which one did you mean?",
                    options,
                )]))
            }

            (Step::WizardCityConfirm, Event::Choice(data)) if data == choice::CITY_AGAIN => {
                *draft = SearchDraft::new(draft.sort);
                state.step = Step::WizardCity;
                Ok(WizardOutcome::Continue(vec![city_prompt()]))
            }

            (Step::WizardCityConfirm, Event::Choice(data)) => {
                let Some(city) = draft.candidates.iter().find(|c| &c.region_id == data).cloned()
                else {
                    return Err(BotError::validation("pick one of the offered cities"));
                };
                let text = format!("City: {}", city.name);
                draft.city = Some(city);
                state.step = Step::WizardCheckIn;
                Ok(WizardOutcome::Continue(vec![
                    Directive::Confirmation(text),
                    check_in_picker(today),
                ]))
            }

            (Step::WizardCheckIn, Event::Date(date)) => {
                if *date < today {
                    return Err(BotError::validation("the check-in date cannot be in the past"));
                }
                draft.check_in = Some(*date);
                draft.check_out = None;
                draft.confirming = Some(DateField::CheckIn);
                state.step = Step::WizardDateConfirm;
                Ok(WizardOutcome::Continue(vec![date_confirm_prompt(
                    "Check-in", *date,
                )]))
            }

            (Step::WizardCheckOut, Event::Date(date)) => {
                draft.check_out = Some(*date);
                draft.confirming = Some(DateField::CheckOut);
                state.step = Step::WizardDateConfirm;
                Ok(WizardOutcome::Continue(vec![date_confirm_prompt(
                    "Check-out", *date,
                )]))
            }

            (Step::WizardDateConfirm, Event::Choice(data)) if data == choice::DATE_CONFIRM => {
                let (Some(field), Some(check_in)) = (draft.confirming, draft.check_in) else {
                    return Err(StateConflict::UnexpectedEvent { step: step.name() }.into());
                };
                if check_in < today {
                    return Err(BotError::validation("the check-in date cannot be in the past"));
                }
                match field {
                    DateField::CheckIn => {
                        draft.confirming = None;
                        state.step = Step::WizardCheckOut;
                        Ok(WizardOutcome::Continue(vec![check_out_picker(check_in)]))
                    }
                    DateField::CheckOut => {
                        let Some(check_out) = draft.check_out else {
                            return Err(StateConflict::UnexpectedEvent { step: step.name() }.into());
                        };
                        if check_out <= check_in {
                            return Err(BotError::validation(
                                "the check-out date must be after the check-in date",
                            ));
                        }
                        draft.confirming = None;
                        let stay = Directive::Confirmation(format!(
                            "Stay: {} - {}",
                            format_date(check_in),
                            format_date(check_out)
                        ));
                        if draft.sort == SearchSort::BestDeal {
                            state.step = Step::WizardMinPrice;
                            Ok(WizardOutcome::Continue(vec![
                                stay,
                                Directive::prompt("Minimum price per night?"),
                            ]))
                        } else {
                            state.step = Step::WizardResultCount;
                            Ok(WizardOutcome::Continue(vec![stay, self.result_count_prompt()]))
                        }
                    }
                }
            }

            (Step::WizardDateConfirm, Event::Choice(data)) if data == choice::DATE_CHANGE => {
                match draft.confirming {
                    Some(DateField::CheckIn) => {
                        draft.check_in = None;
                        draft.check_out = None;
                        draft.confirming = None;
                        state.step = Step::WizardCheckIn;
                        Ok(WizardOutcome::Continue(vec![check_in_picker(today)]))
                    }
                    Some(DateField::CheckOut) => {
                        let Some(check_in) = draft.check_in else {
                            return Err(StateConflict::UnexpectedEvent { step: step.name() }.into());
                        };
                        draft.check_out = None;
                        draft.confirming = None;
                        state.step = Step::WizardCheckOut;
                        Ok(WizardOutcome::Continue(vec![check_out_picker(check_in)]))
                    }
                    None => Err(StateConflict::UnexpectedEvent { step: step.name() }.into()),
                }
            }

            (Step::WizardMinPrice, Event::Text(text)) => {
                let min: u32 = parse_number(text, "the minimum price")?;
                draft.min_price = Some(min);
                state.step = Step::WizardResultCount;
                Ok(WizardOutcome::Continue(vec![self.result_count_prompt()]))
            }

            (Step::WizardResultCount, Event::Text(text) | Event::Choice(text)) => {
                let count: u8 = parse_number(text, "the number of hotels")?;
                if count == 0 || count > self.max_results {
                    return Err(BotError::validation(format!(
                        "the number of hotels must be between 1 and {}",
                        self.max_results
                    )));
                }
                draft.result_count = Some(count);
                state.step = Step::WizardPhotoCount;
                Ok(WizardOutcome::Continue(vec![self.photo_count_prompt()]))
            }

            (Step::WizardPhotoCount, Event::Text(text) | Event::Choice(text)) => {
                let photos: u8 = parse_number(text, "the number of photos")?;
                if !self.photo_choices.contains(&photos) {
                    return Err(BotError::validation(format!(
                        "choose one of {}",
                        self.photo_choice_list()
                    )));
                }
                let criteria = match (draft.city.clone(), draft.check_in, draft.check_out, draft.result_count) {
                    (Some(city), Some(check_in), Some(check_out), Some(result_count)) => {
                        SearchCriteria {
                            sort: draft.sort,
                            city,
                            check_in,
                            check_out,
                            result_count,
                            photo_count: photos,
                            min_price: draft.min_price,
                        }
                    }
                    _ => return Err(StateConflict::UnexpectedEvent { step: step.name() }.into()),
                };
                state.step = Step::Terminal;
                Ok(WizardOutcome::Complete(criteria))
            }

            _ => Err(StateConflict::UnexpectedEvent { step: step.name() }.into()),
        }
    }

    /// The question asked at `step`, used when re-prompting after an error.
    pub fn prompt_for(&self, state: &ConversationState, today: NaiveDate) -> Option<Directive> {
        let draft = state.draft.as_ref()?;
        match state.step {
            Step::WizardCity => Some(city_prompt()),
            Step::WizardCityConfirm => {
                let mut options: Vec<ChoiceOption> = draft
                    .candidates
                    .iter()
                    .map(|c| ChoiceOption::new(c.name.clone(), c.region_id.clone()))
                    .collect();
                options.push(ChoiceOption::new("None of these", choice::CITY_AGAIN));
                Some(Directive::prompt_with("Which one did you mean?", options))
            }
            Step::WizardCheckIn => Some(check_in_picker(today)),
            Step::WizardCheckOut => draft.check_in.map(check_out_picker),
            Step::WizardDateConfirm => match draft.confirming {
                Some(DateField::CheckIn) => draft.check_in.map(|d| date_confirm_prompt("Check-in", d)),
                Some(DateField::CheckOut) => {
                    draft.check_out.map(|d| date_confirm_prompt("Check-out", d))
                }
                None => None,
            },
            Step::WizardMinPrice => Some(Directive::prompt("Minimum price per night?")),
            Step::WizardResultCount => Some(self.result_count_prompt()),
            Step::WizardPhotoCount => Some(self.photo_count_prompt()),
            _ => None,
        }
    }

    fn result_count_prompt(&self) -> Directive {
        let options = [3u8, 5, 10]
            .iter()
            .filter(|n| **n <= self.max_results)
            .map(|n| ChoiceOption::new(n.to_string(), n.to_string()))
            .collect();
        Directive::prompt_with(
            format!("How many hotels should I show (1-{})?", self.max_results),
            options,
        )
    }

    fn photo_count_prompt(&self) -> Directive {
        let options = self
            .photo_choices
            .iter()
            .map(|n| ChoiceOption::new(n.to_string(), n.to_string()))
            .collect();
        Directive::prompt_with("How many photos per hotel?", options)
    }

    fn photo_choice_list(&self) -> String {
        self.photo_choices
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn city_prompt() -> Directive {
    Directive::prompt("Which city are you going to?")
}

fn check_in_picker(today: NaiveDate) -> Directive {
    Directive::DatePicker {
        text: "Choose the check-in date".to_string(),
        min: today,
    }
}

fn check_out_picker(check_in: NaiveDate) -> Directive {
    Directive::DatePicker {
        text: "Choose the check-out date".to_string(),
        min: check_in.succ_opt().unwrap_or(check_in),
    }
}

fn date_confirm_prompt(label: &str, date: NaiveDate) -> Directive {
    Directive::prompt_with(
        format!("{}: {}", label, format_date(date)),
        vec![
            ChoiceOption::new("Confirm", choice::DATE_CONFIRM),
            ChoiceOption::new("Change", choice::DATE_CHANGE),
        ],
    )
}
