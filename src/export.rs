use std::fmt::Write;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::warn;

use crate::error::{FeedbackError, Result};
use crate::models::{Answer, ConstSumTarget, QuestionDetails, RankTarget};
use crate::results::{DisplayIdentity, QuestionResults, ResultRow, ResultsBundle};
use crate::statistics::{
    self, contribution_text, format_number, sub_question_letter, QuestionStatistics,
};

pub const NO_RESPONSE: &str = "No Response";
const GENERAL_CELL: &str = "-";

const IDENTITY_HEADER: [&str; 8] = [
    "Team",
    "Giver's Full Name",
    "Giver's Last Name",
    "Giver's Email",
    "Recipient's Team",
    "Recipient's Full Name",
    "Recipient's Last Name",
    "Recipient's Email",
];

const CONTRIB_NOTES: [&str; 3] = [
    "In the points given below, an equal share is equal to 100 points. e.g. 80 means \"Equal share - 20%\" and 110 means \"Equal share + 10%\".",
    "Claimed Contribution (CC) = the contribution claimed by the student.",
    "Perceived Contribution (PC) = the average value of student's contribution as perceived by the team members.",
];

fn csv_line<I, T>(fields: I) -> Result<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(|err| FeedbackError::Render(err.to_string()))?;
    let bytes = writer
        .into_inner()
        .map_err(|err| FeedbackError::Render(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| FeedbackError::Render(err.to_string()))
}

struct Table {
    output: String,
}

impl Table {
    fn record<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.output.push_str(&csv_line(fields)?);
        Ok(())
    }

    fn raw(&mut self, line: &str) {
        let _ = writeln!(self.output, "{line}");
    }

    fn blank(&mut self) {
        let _ = writeln!(self.output);
    }
}

/// Renders the whole bundle. Output is deterministic for identical input.
pub fn export(bundle: &ResultsBundle, include_statistics: bool) -> Result<String> {
    let mut table = Table {
        output: String::new(),
    };

    table.record(["Course", bundle.session.course_id.as_str()])?;
    table.record(["Session Name", bundle.session.name.as_str()])?;
    table.blank();
    table.blank();

    for results in &bundle.questions {
        let number = format!("Question {}", results.question.number);
        table.record([number.as_str(), results.question.text.as_str()])?;
        table.blank();

        if include_statistics {
            table.record(["Summary Statistics", ""])?;
            match statistics::compute(results) {
                Ok(stats) => write_statistics(&mut table, &stats)?,
                Err(err) => {
                    warn!(
                        "Statistics for question {} of {}/{} unavailable: {}",
                        results.question.number,
                        bundle.session.course_id,
                        bundle.session.name,
                        err
                    );
                    table.record([format!("Statistics unavailable: {err}")])?;
                }
            }
            table.blank();
        }

        write_details(&mut table, results)?;
        table.blank();
        table.blank();
    }

    Ok(table.output)
}

fn write_statistics(table: &mut Table, stats: &QuestionStatistics) -> Result<()> {
    match stats {
        QuestionStatistics::Choices(rows) => {
            table.raw("Choice, Response Count, Percentage");
            for row in rows {
                table.record([
                    row.choice.clone(),
                    row.count.to_string(),
                    format_number(row.percentage),
                ])?;
            }
        }
        QuestionStatistics::NumScale(rows) => {
            table.raw("Team, Recipient, Average, Minimum, Maximum");
            for row in rows {
                table.record([
                    row.team.clone(),
                    row.recipient.clone(),
                    format_number(row.average),
                    format_number(row.min),
                    format_number(row.max),
                ])?;
            }
        }
        QuestionStatistics::OptionPoints(rows) => {
            table.raw("Option, Average Points");
            for row in rows {
                table.record([row.option.clone(), optional_number(row.average)])?;
            }
        }
        QuestionStatistics::RecipientPoints(rows) => {
            table.raw("Team, Recipient, Average Points");
            for row in rows {
                table.record([
                    row.team.clone(),
                    row.recipient.clone(),
                    format_number(row.average),
                ])?;
            }
        }
        QuestionStatistics::Contribution(rows) => {
            for note in CONTRIB_NOTES {
                table.raw(note);
            }
            table.raw("Team, Name, Email, CC, PC, Ratings Recieved");
            for row in rows {
                let mut fields = vec![
                    row.team.clone(),
                    row.name.clone(),
                    row.email.clone(),
                    row.claimed.clone(),
                    row.perceived.clone(),
                ];
                fields.extend(row.received.iter().cloned());
                table.record(fields)?;
            }
        }
        QuestionStatistics::Rubric {
            choices,
            weights,
            rows,
        } => {
            let mut header = vec![String::new()];
            match weights {
                Some(weights) => {
                    header.extend(choices.iter().zip(weights).map(|(choice, weight)| {
                        format!("{choice} (Weight: {})", format_number(*weight))
                    }));
                    header.push("Average".to_string());
                }
                None => header.extend(choices.iter().cloned()),
            }
            table.record(header)?;

            for row in rows {
                let mut fields = vec![row.label.clone()];
                fields.extend(row.cells.iter().map(|cell| match cell.percent {
                    Some(percent) => format!("{percent}% ({})", cell.count),
                    None => format!("- ({})", cell.count),
                }));
                if weights.is_some() {
                    fields.push(optional_number(row.average));
                }
                table.record(fields)?;
            }
        }
        QuestionStatistics::OptionRanks(rows) => {
            table.raw("Option, Average Rank");
            for row in rows {
                table.record([row.option.clone(), optional_number(row.average)])?;
            }
        }
        QuestionStatistics::RecipientRanks(rows) => {
            table.raw("Team, Recipient, Average Rank");
            for row in rows {
                table.record([
                    row.team.clone(),
                    row.recipient.clone(),
                    format_number(row.average),
                ])?;
            }
        }
    }
    Ok(())
}

fn optional_number(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_else(|| "-".to_string())
}

fn identity_cells(identity: &DisplayIdentity) -> [String; 4] {
    if identity.is_general() {
        return std::array::from_fn(|_| GENERAL_CELL.to_string());
    }
    [
        identity.team.clone(),
        identity.name.clone(),
        identity.last_name.clone(),
        identity.email.clone(),
    ]
}

fn row_prefix(row: &ResultRow) -> Vec<String> {
    let mut fields = Vec::with_capacity(12);
    fields.extend(identity_cells(row.giver()));
    fields.extend(identity_cells(row.recipient()));
    fields
}

fn answer_header(details: &QuestionDetails) -> Vec<String> {
    match details {
        QuestionDetails::Msq {
            choices,
            other_enabled,
        } => {
            let mut header = vec!["Feedbacks:".to_string()];
            header.extend(choices.iter().cloned());
            if *other_enabled {
                header.push(statistics::OTHER_CHOICE.to_string());
            }
            header
        }
        QuestionDetails::ConstSum {
            target: ConstSumTarget::Options(options),
            ..
        } => {
            let mut header = vec!["Feedbacks:".to_string()];
            header.extend(options.iter().cloned());
            header
        }
        QuestionDetails::Rank {
            target: RankTarget::Options(options),
        } => (1..=options.len()).map(|rank| format!("Rank {rank}")).collect(),
        QuestionDetails::Rubric { .. } => vec![
            "Sub Question".to_string(),
            "Choice Value".to_string(),
            "Choice Number".to_string(),
        ],
        _ => vec!["Feedback".to_string()],
    }
}

fn answer_cells(details: &QuestionDetails, answer: &Answer) -> Result<Vec<String>> {
    let cells = match (details, answer) {
        (QuestionDetails::Msq { choices, other_enabled }, Answer::Msq(selected)) => {
            let mut cells = vec![String::new()];
            cells.extend(choices.iter().map(|choice| {
                if selected.contains(choice) {
                    choice.clone()
                } else {
                    String::new()
                }
            }));
            if *other_enabled {
                let others: Vec<&str> = selected
                    .iter()
                    .filter(|s| !choices.contains(s))
                    .map(String::as_str)
                    .collect();
                cells.push(others.join(", "));
            }
            cells
        }
        (
            QuestionDetails::ConstSum {
                target: ConstSumTarget::Options(_),
                ..
            },
            Answer::ConstSum(points),
        ) => std::iter::once(String::new())
            .chain(points.iter().map(u32::to_string))
            .collect(),
        (
            QuestionDetails::Rank {
                target: RankTarget::Options(options),
            },
            Answer::Rank(ranks),
        ) => (1..=options.len() as u32)
            .map(|rank| {
                options
                    .iter()
                    .zip(ranks)
                    .filter(|(_, given)| **given == rank)
                    .map(|(option, _)| option.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect(),
        (_, Answer::Mcq(choice)) => vec![choice.clone()],
        (_, Answer::NumScale(value)) => vec![format_number(*value)],
        (_, Answer::ConstSum(points)) => vec![first_number(points)],
        (_, Answer::Rank(ranks)) => vec![first_number(ranks)],
        (_, Answer::Contrib(value)) => vec![contribution_text(*value)],
        (details, answer) => {
            return Err(FeedbackError::AnswerMismatch {
                expected: details.kind(),
                found: answer.kind(),
            })
        }
    };
    Ok(cells)
}

fn first_number(values: &[u32]) -> String {
    values
        .first()
        .map(u32::to_string)
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}

fn write_details(table: &mut Table, results: &QuestionResults) -> Result<()> {
    let details = &results.question.details;
    let mut header: Vec<String> = IDENTITY_HEADER.iter().map(|h| h.to_string()).collect();
    header.extend(answer_header(details));
    table.record(header)?;

    for row in &results.rows {
        match (details, row) {
            (
                QuestionDetails::Rubric {
                    sub_questions,
                    choices,
                    ..
                },
                ResultRow::Response(response),
            ) => {
                let picks: &[Option<usize>] = match &response.answer {
                    Answer::Rubric(picks) => picks.as_slice(),
                    other => {
                        return Err(FeedbackError::AnswerMismatch {
                            expected: details.kind(),
                            found: other.kind(),
                        })
                    }
                };
                for index in 0..sub_questions.len() {
                    let mut fields = row_prefix(row);
                    fields.push(sub_question_letter(index));
                    match picks.get(index).copied().flatten() {
                        Some(choice) => {
                            fields.push(choices.get(choice).cloned().unwrap_or_default());
                            fields.push((choice + 1).to_string());
                        }
                        None => {
                            fields.push(NO_RESPONSE.to_string());
                            fields.push(String::new());
                        }
                    }
                    table.record(fields)?;
                }
            }
            (QuestionDetails::Rubric { .. }, ResultRow::Missing { .. }) => {
                let mut fields = row_prefix(row);
                fields.push("All Sub-Questions".to_string());
                fields.push(NO_RESPONSE.to_string());
                table.record(fields)?;
            }
            (_, ResultRow::Response(response)) => {
                let mut fields = row_prefix(row);
                fields.extend(answer_cells(details, &response.answer)?);
                table.record(fields)?;
            }
            (_, ResultRow::Missing { .. }) => {
                let mut fields = row_prefix(row);
                fields.push(NO_RESPONSE.to_string());
                table.record(fields)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, CREATOR};
    use crate::models::{
        ContributionValue, ParticipantType, Question, Response, VisibilityPolicy, VisibilityTag,
    };
    use crate::results::aggregate;

    const DETAIL_HEADER: &str = "Team,Giver's Full Name,Giver's Last Name,Giver's Email,Recipient's Team,Recipient's Full Name,Recipient's Last Name,Recipient's Email";

    #[test]
    fn five_student_mcq_report() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![
            fixtures::general_response(&question, "ana@uni.edu", Answer::Mcq("A".to_string())),
            fixtures::general_response(&question, "cai@uni.edu", Answer::Mcq("B".to_string())),
        ];
        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();

        let expected = format!(
            "Course,CS101\n\
             Session Name,Week 1\n\
             \n\
             \n\
             Question 1,Which topic was hardest?\n\
             \n\
             Summary Statistics,\n\
             Choice, Response Count, Percentage\n\
             A,1,50\n\
             B,1,50\n\
             \n\
             {DETAIL_HEADER},Feedback\n\
             Team A,Ana Ruiz,Ruiz,ana@uni.edu,-,-,-,-,A\n\
             Team A,Ben Okafor,Okafor,ben@uni.edu,-,-,-,-,No Response\n\
             Team A,Dev Sharma,Sharma,dev@uni.edu,-,-,-,-,No Response\n\
             Team A,Eve Martin,Martin,eve@uni.edu,-,-,-,-,No Response\n\
             Team B,Cai Lin,Lin,cai@uni.edu,-,-,-,-,B\n\
             \n\
             \n"
        );
        assert_eq!(export(&bundle, true).unwrap(), expected);
    }

    #[test]
    fn export_is_deterministic_and_quotes_when_needed() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = Question::new(
            &session,
            1,
            "Rate \"effort\", honestly",
            ParticipantType::Students,
            ParticipantType::OwnTeamMembers,
            QuestionDetails::NumScale {
                min: 1.0,
                max: 5.0,
                step: 0.5,
            },
            VisibilityPolicy::new(
                &[VisibilityTag::Instructors],
                &[],
                &[VisibilityTag::Instructors],
            ),
        );
        let responses = vec![Response::new(
            &question,
            "ana@uni.edu",
            "ben@uni.edu",
            Answer::NumScale(3.5),
        )];
        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();

        let first = export(&bundle, true).unwrap();
        let second = export(&bundle, true).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Question 1,\"Rate \"\"effort\"\", honestly\"\n"));

        let anonymous = bundle.questions[0].rows[0].giver().clone();
        assert!(first.contains(&format!(
            "{},{},{},-,Team A,Ben Okafor,Okafor,ben@uni.edu,3.5\n",
            anonymous.team, anonymous.name, anonymous.name
        )));
        assert!(first.contains("Team A,Ben Okafor,3.5,3.5,3.5\n"));
    }

    #[test]
    fn statistics_can_be_left_out() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let bundle = aggregate(&session, &[question], &[], &roster, CREATOR, None).unwrap();
        let output = export(&bundle, false).unwrap();
        assert!(!output.contains("Summary Statistics"));
        assert_eq!(output.matches(NO_RESPONSE).count(), 5);
    }

    #[test]
    fn failing_statistics_do_not_abort_export() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![fixtures::general_response(
            &question,
            "ana@uni.edu",
            Answer::Mcq("Z".to_string()),
        )];
        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        let output = export(&bundle, true).unwrap();
        assert!(output.contains("Statistics unavailable: Invalid question 1"));
        assert!(output.contains("Team A,Ana Ruiz,Ruiz,ana@uni.edu,-,-,-,-,Z\n"));
    }

    #[test]
    fn unavailable_statistics_line_is_one_csv_field() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![fixtures::general_response(
            &question,
            "ana@uni.edu",
            Answer::Mcq("Yes, definitely".to_string()),
        )];
        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        let output = export(&bundle, true).unwrap();

        let line = output
            .lines()
            .find(|line| line.contains("Statistics unavailable"))
            .unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(line.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), 1);
        assert!(record[0].starts_with("Statistics unavailable: Invalid question 1"));
        assert!(record[0].contains("'Yes, definitely'"));
    }

    #[test]
    fn mismatched_answer_cells_are_rejected() {
        let msq = QuestionDetails::Msq {
            choices: vec!["A".to_string()],
            other_enabled: false,
        };
        assert!(matches!(
            answer_cells(&msq, &Answer::Rubric(vec![Some(0)])),
            Err(FeedbackError::AnswerMismatch { .. })
        ));
        assert!(matches!(
            answer_cells(&QuestionDetails::Contrib, &Answer::Msq(vec!["A".to_string()])),
            Err(FeedbackError::AnswerMismatch { .. })
        ));
    }

    #[test]
    fn rubric_rows_per_sub_question() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = Question::new(
            &session,
            1,
            "Assess the report",
            ParticipantType::Students,
            ParticipantType::Nobody,
            QuestionDetails::Rubric {
                sub_questions: vec!["Clear".to_string(), "Concise".to_string()],
                choices: vec!["Yes".to_string(), "No".to_string()],
                weights: Some(vec![1.25, -1.7]),
            },
            VisibilityPolicy::open_to(&[VisibilityTag::Instructors]),
        );
        let responses = vec![fixtures::general_response(
            &question,
            "ana@uni.edu",
            Answer::Rubric(vec![Some(0), None]),
        )];
        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        let output = export(&bundle, true).unwrap();

        assert!(output.contains(",Yes (Weight: 1.25),No (Weight: -1.7),Average\n"));
        assert!(output.contains("a) Clear,100% (1),0% (0),1.25\n"));
        assert!(output.contains("b) Concise,- (0),- (0),-\n"));
        assert!(output.contains(&format!("{DETAIL_HEADER},Sub Question,Choice Value,Choice Number\n")));
        assert!(output.contains("Team A,Ana Ruiz,Ruiz,ana@uni.edu,-,-,-,-,a,Yes,1\n"));
        assert!(output.contains("Team A,Ana Ruiz,Ruiz,ana@uni.edu,-,-,-,-,b,No Response,\n"));
        assert!(output.contains("Team A,Ben Okafor,Okafor,ben@uni.edu,-,-,-,-,All Sub-Questions,No Response\n"));
    }

    #[test]
    fn rank_of_options_lists_options_per_rank() {
        let details = QuestionDetails::Rank {
            target: RankTarget::Options(vec!["X".to_string(), "Y".to_string(), "Z".to_string()]),
        };
        assert_eq!(answer_header(&details), vec!["Rank 1", "Rank 2", "Rank 3"]);
        assert_eq!(
            answer_cells(&details, &Answer::Rank(vec![1, 1, 3])).unwrap(),
            vec!["X, Y", "", "Z"]
        );
    }

    #[test]
    fn msq_and_contribution_cells() {
        let msq = QuestionDetails::Msq {
            choices: vec!["A".to_string(), "B".to_string()],
            other_enabled: true,
        };
        assert_eq!(
            answer_cells(&msq, &Answer::Msq(vec!["B".to_string(), "Tea".to_string()])).unwrap(),
            vec!["", "", "B", "Tea"]
        );
        assert_eq!(
            answer_cells(
                &QuestionDetails::Contrib,
                &Answer::Contrib(ContributionValue::Points(80))
            )
            .unwrap(),
            vec!["Equal share - 20%"]
        );
    }

    #[test]
    fn contribution_block_explains_equal_share() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = Question::new(
            &session,
            1,
            "Estimate contributions",
            ParticipantType::Students,
            ParticipantType::OwnTeamMembersIncludingSelf,
            QuestionDetails::Contrib,
            VisibilityPolicy::open_to(&[VisibilityTag::Instructors]),
        );
        let responses = vec![
            Response::new(
                &question,
                "cai@uni.edu",
                "cai@uni.edu",
                Answer::Contrib(ContributionValue::Points(100)),
            ),
        ];
        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        let output = export(&bundle, true).unwrap();
        assert!(output.contains(CONTRIB_NOTES[1]));
        assert!(output.contains("Team, Name, Email, CC, PC, Ratings Recieved\n"));
        assert!(output.contains(&format!(
            "{}\nTeam, Name, Email, CC, PC, Ratings Recieved\n",
            CONTRIB_NOTES[2]
        )));
        assert!(output.contains("Team B,Cai Lin,cai@uni.edu,Equal share,N/A,N/A\n"));
        assert!(output.contains("Team A,Ana Ruiz,ana@uni.edu,Not Submitted,N/A,N/A,N/A,N/A\n"));
    }
}
