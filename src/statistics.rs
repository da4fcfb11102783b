use std::collections::BTreeMap;

use crate::error::{FeedbackError, Result};
use crate::models::{Answer, ConstSumTarget, ContributionValue, QuestionDetails, RankTarget};
use crate::results::{DisplayIdentity, DisplayedResponse, QuestionResults};

pub const OTHER_CHOICE: &str = "Other";
pub const NOT_SUBMITTED: &str = "Not Submitted";
pub const NOT_AVAILABLE: &str = "N/A";
pub const NOT_SURE: &str = "Not Sure";

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceCount {
    pub choice: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipientAverage {
    pub team: String,
    pub recipient: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumScaleRow {
    pub team: String,
    pub recipient: String,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionAverage {
    pub option: String,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContributionRow {
    pub team: String,
    pub name: String,
    pub email: String,
    pub claimed: String,
    pub perceived: String,
    pub received: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RubricCell {
    pub count: usize,
    pub percent: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RubricRow {
    pub label: String,
    pub cells: Vec<RubricCell>,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuestionStatistics {
    Choices(Vec<ChoiceCount>),
    NumScale(Vec<NumScaleRow>),
    OptionPoints(Vec<OptionAverage>),
    RecipientPoints(Vec<RecipientAverage>),
    Contribution(Vec<ContributionRow>),
    Rubric {
        choices: Vec<String>,
        weights: Option<Vec<f64>>,
        rows: Vec<RubricRow>,
    },
    OptionRanks(Vec<OptionAverage>),
    RecipientRanks(Vec<RecipientAverage>),
}

pub fn compute(results: &QuestionResults) -> Result<QuestionStatistics> {
    let number = results.question.number;
    let invalid = |reason: String| FeedbackError::InvalidQuestion { number, reason };
    let responses: Vec<&DisplayedResponse> = results.responses().collect();

    match &results.question.details {
        QuestionDetails::Mcq {
            choices,
            other_enabled,
        } => {
            let picks = responses
                .iter()
                .map(|r| match &r.answer {
                    Answer::Mcq(choice) => Ok(vec![choice.as_str()]),
                    other => Err(mismatch(results, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            choice_counts(choices, *other_enabled, &picks).map_err(invalid)
        }
        QuestionDetails::Msq {
            choices,
            other_enabled,
        } => {
            let picks = responses
                .iter()
                .map(|r| match &r.answer {
                    Answer::Msq(selected) => {
                        Ok(selected.iter().map(String::as_str).collect::<Vec<_>>())
                    }
                    other => Err(mismatch(results, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            choice_counts(choices, *other_enabled, &picks).map_err(invalid)
        }
        QuestionDetails::NumScale { .. } => {
            let mut grouped: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
            for response in &responses {
                let value = match &response.answer {
                    Answer::NumScale(value) => *value,
                    other => return Err(mismatch(results, other)),
                };
                grouped
                    .entry(recipient_key(&response.recipient))
                    .or_default()
                    .push(value);
            }
            Ok(QuestionStatistics::NumScale(
                grouped
                    .into_iter()
                    .map(|((team, recipient), values)| NumScaleRow {
                        team: team.to_string(),
                        recipient: recipient.to_string(),
                        average: mean(&values).unwrap_or_default(),
                        min: values.iter().copied().fold(f64::INFINITY, f64::min),
                        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    })
                    .collect(),
            ))
        }
        QuestionDetails::ConstSum {
            target: ConstSumTarget::Options(options),
            ..
        } => {
            let mut totals = vec![Vec::new(); options.len()];
            for response in &responses {
                let points = match &response.answer {
                    Answer::ConstSum(points) => points,
                    other => return Err(mismatch(results, other)),
                };
                if points.len() != options.len() {
                    return Err(invalid(format!(
                        "expected {} point values, found {}",
                        options.len(),
                        points.len()
                    )));
                }
                for (slot, value) in totals.iter_mut().zip(points) {
                    slot.push(f64::from(*value));
                }
            }
            Ok(QuestionStatistics::OptionPoints(option_averages(
                options, &totals,
            )))
        }
        QuestionDetails::ConstSum {
            target: ConstSumTarget::Recipients,
            ..
        } => {
            let values = single_values(results, &responses, |answer| match answer {
                Answer::ConstSum(points) => Some(points.first().copied()),
                _ => None,
            })?;
            Ok(QuestionStatistics::RecipientPoints(recipient_averages(
                values,
            )))
        }
        QuestionDetails::Contrib => contribution(results, &responses),
        QuestionDetails::Rubric {
            sub_questions,
            choices,
            weights,
        } => {
            if let Some(weights) = weights {
                if weights.len() != choices.len() {
                    return Err(invalid(format!(
                        "{} weights configured for {} choices",
                        weights.len(),
                        choices.len()
                    )));
                }
            }
            let mut counts = vec![vec![0usize; choices.len()]; sub_questions.len()];
            for response in &responses {
                let picks = match &response.answer {
                    Answer::Rubric(picks) => picks,
                    other => return Err(mismatch(results, other)),
                };
                for (row, pick) in counts.iter_mut().zip(picks) {
                    if let Some(index) = pick {
                        let cell = row.get_mut(*index).ok_or_else(|| {
                            invalid(format!("rubric choice {} does not exist", index + 1))
                        })?;
                        *cell += 1;
                    }
                }
            }
            let rows = sub_questions
                .iter()
                .zip(counts)
                .enumerate()
                .map(|(index, (text, counts))| rubric_row(index, text, &counts, weights.as_deref()))
                .collect();
            Ok(QuestionStatistics::Rubric {
                choices: choices.clone(),
                weights: weights.clone(),
                rows,
            })
        }
        QuestionDetails::Rank {
            target: RankTarget::Options(options),
        } => {
            let mut ranks = vec![Vec::new(); options.len()];
            for response in &responses {
                let given = match &response.answer {
                    Answer::Rank(given) => given,
                    other => return Err(mismatch(results, other)),
                };
                for (slot, rank) in ranks.iter_mut().zip(given) {
                    if *rank > 0 {
                        slot.push(f64::from(*rank));
                    }
                }
            }
            Ok(QuestionStatistics::OptionRanks(option_averages(
                options, &ranks,
            )))
        }
        QuestionDetails::Rank {
            target: RankTarget::Recipients,
        } => {
            let values = single_values(results, &responses, |answer| match answer {
                Answer::Rank(ranks) => Some(ranks.first().copied()),
                _ => None,
            })?;
            Ok(QuestionStatistics::RecipientRanks(recipient_averages(
                values,
            )))
        }
    }
}

fn mismatch(results: &QuestionResults, found: &Answer) -> FeedbackError {
    FeedbackError::AnswerMismatch {
        expected: results.question.kind(),
        found: found.kind(),
    }
}

fn recipient_key(identity: &DisplayIdentity) -> (&str, &str) {
    (&identity.team, &identity.name)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Formats with at most two decimals and no trailing zeros.
pub fn format_number(value: f64) -> String {
    let formatted = format!("{:.2}", round_to(value, 2));
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn equal_share(value: i64) -> String {
    match value.cmp(&100) {
        std::cmp::Ordering::Greater => format!("Equal share + {}%", value - 100),
        std::cmp::Ordering::Less => format!("Equal share - {}%", 100 - value),
        std::cmp::Ordering::Equal => "Equal share".to_string(),
    }
}

pub fn contribution_text(value: ContributionValue) -> String {
    match value {
        ContributionValue::Points(points) => equal_share(i64::from(points)),
        ContributionValue::NotSure => NOT_SURE.to_string(),
    }
}

fn choice_counts(
    choices: &[String],
    other_enabled: bool,
    picks: &[Vec<&str>],
) -> std::result::Result<QuestionStatistics, String> {
    let mut counts = vec![0usize; choices.len()];
    let mut other = 0usize;
    for pick in picks.iter().flatten() {
        match choices.iter().position(|c| c == pick) {
            Some(index) => counts[index] += 1,
            None if other_enabled => other += 1,
            None => return Err(format!("answer '{pick}' is not one of the choices")),
        }
    }

    let total = counts.iter().sum::<usize>() + other;
    let percentage = |count: usize| {
        if total == 0 {
            0.0
        } else {
            round_to(100.0 * count as f64 / total as f64, 2)
        }
    };

    let mut rows: Vec<ChoiceCount> = choices
        .iter()
        .zip(&counts)
        .map(|(choice, count)| ChoiceCount {
            choice: choice.clone(),
            count: *count,
            percentage: percentage(*count),
        })
        .collect();
    if other_enabled {
        rows.push(ChoiceCount {
            choice: OTHER_CHOICE.to_string(),
            count: other,
            percentage: percentage(other),
        });
    }
    Ok(QuestionStatistics::Choices(rows))
}

fn option_averages(options: &[String], values: &[Vec<f64>]) -> Vec<OptionAverage> {
    options
        .iter()
        .zip(values)
        .map(|(option, values)| OptionAverage {
            option: option.clone(),
            average: mean(values),
        })
        .collect()
}

fn single_values<'a>(
    results: &QuestionResults,
    responses: &[&'a DisplayedResponse],
    extract: impl Fn(&Answer) -> Option<Option<u32>>,
) -> Result<Vec<(&'a DisplayIdentity, f64)>> {
    let mut values = Vec::new();
    for &response in responses {
        match extract(&response.answer) {
            Some(Some(value)) => values.push((&response.recipient, f64::from(value))),
            Some(None) => {}
            None => return Err(mismatch(results, &response.answer)),
        }
    }
    Ok(values)
}

fn recipient_averages(values: Vec<(&DisplayIdentity, f64)>) -> Vec<RecipientAverage> {
    let mut grouped: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    for (recipient, value) in values {
        grouped
            .entry(recipient_key(recipient))
            .or_default()
            .push(value);
    }
    grouped
        .into_iter()
        .map(|((team, recipient), values)| RecipientAverage {
            team: team.to_string(),
            recipient: recipient.to_string(),
            average: mean(&values).unwrap_or_default(),
        })
        .collect()
}

fn contribution(
    results: &QuestionResults,
    responses: &[&DisplayedResponse],
) -> Result<QuestionStatistics> {
    let mut rows = Vec::new();
    for slot in &results.participants {
        let mut claimed = None;
        let mut ratings = Vec::new();
        for response in responses.iter().filter(|r| r.recipient.id == slot.identity.id) {
            let value = match &response.answer {
                Answer::Contrib(value) => *value,
                other => return Err(mismatch(results, other)),
            };
            if response.self_addressed {
                claimed = Some(value);
            } else {
                ratings.push(value);
            }
        }

        let mut points: Vec<u32> = ratings
            .iter()
            .filter_map(|value| match value {
                ContributionValue::Points(points) => Some(*points),
                ContributionValue::NotSure => None,
            })
            .collect();
        let perceived = mean(&points.iter().map(|p| f64::from(*p)).collect::<Vec<_>>())
            .map(|pc| equal_share(pc.round() as i64))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        points.sort_unstable_by(|a, b| b.cmp(a));
        let mut received: Vec<String> = points
            .into_iter()
            .map(|p| equal_share(i64::from(p)))
            .collect();
        let not_sure = ratings.len() - received.len();
        received.extend(std::iter::repeat(NOT_SURE.to_string()).take(not_sure));
        let expected = slot.peer_count.max(1);
        if received.len() < expected {
            received.extend(
                std::iter::repeat(NOT_AVAILABLE.to_string()).take(expected - received.len()),
            );
        }

        rows.push(ContributionRow {
            team: slot.identity.team.clone(),
            name: slot.identity.name.clone(),
            email: slot.identity.email.clone(),
            claimed: claimed
                .map(contribution_text)
                .unwrap_or_else(|| NOT_SUBMITTED.to_string()),
            perceived,
            received,
        });
    }
    rows.sort_by(|a, b| (&a.team, &a.name).cmp(&(&b.team, &b.name)));
    Ok(QuestionStatistics::Contribution(rows))
}

fn rubric_row(index: usize, text: &str, counts: &[usize], weights: Option<&[f64]>) -> RubricRow {
    let total: usize = counts.iter().sum();
    let cells = counts
        .iter()
        .map(|count| RubricCell {
            count: *count,
            percent: (total > 0)
                .then(|| (100.0 * *count as f64 / total as f64).round() as u32),
        })
        .collect();
    let average = match weights {
        Some(weights) if total > 0 => {
            let weighted: f64 = counts
                .iter()
                .zip(weights)
                .map(|(count, weight)| *count as f64 * weight)
                .sum();
            Some(round_to(weighted / total as f64, 2))
        }
        _ => None,
    };
    RubricRow {
        label: format!("{}) {}", sub_question_letter(index), text),
        cells,
        average,
    }
}

/// `a`, `b`, ... `z`, `aa`, `ab`, ...
pub fn sub_question_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}
