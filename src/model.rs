use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};

use crate::schema::{
    answer_sheets, chapters, grading_results, problems, problems_in_quizzes, quizzes, study_logs,
    user_answers, user_problem_stats, users,
};

/// Lifecycle shared by quizzes and answer sheets.
///
/// The only legal moves are `in_progress -> graded -> reviewed`; regrading a
/// graded sheet is allowed, a reviewed sheet is frozen.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum SheetStatus {
    InProgress,
    Graded,
    Reviewed,
}

impl SheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetStatus::InProgress => "in_progress",
            SheetStatus::Graded => "graded",
            SheetStatus::Reviewed => "reviewed",
        }
    }

    pub fn can_transition_to(&self, next: SheetStatus) -> bool {
        matches!(
            (self, next),
            (SheetStatus::InProgress, SheetStatus::Graded)
                | (SheetStatus::Graded, SheetStatus::Graded)
                | (SheetStatus::Graded, SheetStatus::Reviewed)
        )
    }
}

impl fmt::Display for SheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SheetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SheetStatus::InProgress),
            "graded" => Ok(SheetStatus::Graded),
            "reviewed" => Ok(SheetStatus::Reviewed),
            other => Err(format!("unknown sheet status: {}", other)),
        }
    }
}

/// Difficulty of a single problem.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// Difficulty requested at quiz creation; `random` means the whole chapter
/// pool regardless of problem difficulty.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum QuizDifficulty {
    Easy,
    Medium,
    Hard,
    Random,
}

impl QuizDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizDifficulty::Easy => "easy",
            QuizDifficulty::Medium => "medium",
            QuizDifficulty::Hard => "hard",
            QuizDifficulty::Random => "random",
        }
    }

    /// The problem-pool filter this difficulty implies, `None` for `random`.
    pub fn problem_filter(&self) -> Option<Difficulty> {
        match self {
            QuizDifficulty::Easy => Some(Difficulty::Easy),
            QuizDifficulty::Medium => Some(Difficulty::Medium),
            QuizDifficulty::Hard => Some(Difficulty::Hard),
            QuizDifficulty::Random => None,
        }
    }
}

impl fmt::Display for QuizDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizDifficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(QuizDifficulty::Easy),
            "medium" => Ok(QuizDifficulty::Medium),
            "hard" => Ok(QuizDifficulty::Hard),
            "random" => Ok(QuizDifficulty::Random),
            other => Err(format!("unknown quiz difficulty: {}", other)),
        }
    }
}

/// Verdict recorded per (answer sheet, problem) at grading time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum GradeVerdict {
    Correct,
    Incorrect,
}

impl GradeVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeVerdict::Correct => "correct",
            GradeVerdict::Incorrect => "incorrect",
        }
    }

    pub fn from_is_correct(is_correct: bool) -> Self {
        if is_correct {
            GradeVerdict::Correct
        } else {
            GradeVerdict::Incorrect
        }
    }
}

impl fmt::Display for GradeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradeVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(GradeVerdict::Correct),
            "incorrect" => Ok(GradeVerdict::Incorrect),
            other => Err(format!("unknown grade verdict: {}", other)),
        }
    }
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql<Text, Sqlite> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $ty {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                raw.parse::<$ty>().map_err(Into::into)
            }
        }
    };
}

text_enum_sql!(SheetStatus);
text_enum_sql!(Difficulty);
text_enum_sql!(QuizDifficulty);
text_enum_sql!(GradeVerdict);

#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = chapters)]
#[diesel(check_for_backend(Sqlite))]
pub struct Chapter {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub chapter_order: Option<i32>,
    pub problems_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = problems)]
#[diesel(check_for_backend(Sqlite))]
pub struct Problem {
    pub id: i32,
    pub chapter_id: i32,
    pub difficulty: Difficulty,
    pub problem_text: String,
    pub image_url: Option<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub choices_count: i32,
    pub attempt_count: i32,
    pub correct_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = quizzes)]
#[diesel(check_for_backend(Sqlite))]
pub struct Quiz {
    pub id: i32,
    pub title: String,
    pub user_id: i32,
    pub chapter_id: i32,
    pub difficulty: QuizDifficulty,
    pub total_problems_count: i32,
    pub status: SheetStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    #[serde(skip)]
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = quizzes)]
pub struct NewQuiz<'a> {
    pub title: &'a str,
    pub user_id: i32,
    pub chapter_id: i32,
    pub difficulty: QuizDifficulty,
    pub total_problems_count: i32,
    pub status: SheetStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = problems_in_quizzes)]
#[diesel(check_for_backend(Sqlite))]
pub struct ProblemInQuiz {
    pub id: i32,
    pub quiz_id: i32,
    pub problem_id: i32,
    pub problem_number: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = problems_in_quizzes)]
pub struct NewProblemInQuiz {
    pub quiz_id: i32,
    pub problem_id: i32,
    pub problem_number: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = answer_sheets)]
#[diesel(check_for_backend(Sqlite))]
pub struct AnswerSheet {
    pub id: i32,
    pub quiz_id: i32,
    pub user_id: i32,
    pub status: SheetStatus,
    pub passed_time: Option<i32>,
    pub unanswered_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = user_answers)]
#[diesel(check_for_backend(Sqlite))]
pub struct UserAnswer {
    pub id: i32,
    pub answer_sheet_id: i32,
    pub problem_id: i32,
    pub user_answer: Option<String>,
    pub is_correct: bool,
    pub is_starred: bool,
    pub has_answer: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = grading_results)]
#[diesel(check_for_backend(Sqlite))]
pub struct GradingResult {
    pub id: i32,
    pub answer_sheet_id: i32,
    pub problem_id: i32,
    pub result: GradeVerdict,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = user_problem_stats)]
#[diesel(check_for_backend(Sqlite))]
pub struct UserProblemStat {
    pub id: i32,
    pub user_id: i32,
    pub problem_id: i32,
    pub is_starred: bool,
    pub correct_attempts_count: i32,
    pub total_attempts_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = study_logs)]
#[diesel(check_for_backend(Sqlite))]
pub struct StudyLog {
    pub id: i32,
    pub user_id: i32,
    pub quiz_date: NaiveDate,
    pub quiz_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Sqlite))]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password: String,
    pub review_completed_quizzes_count: i32,
    pub graded_quizzes_count: i32,
    pub ongoing_quizzes_count: i32,
    pub last_login_at: Option<NaiveDateTime>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_the_state_machine() {
        assert!(SheetStatus::InProgress.can_transition_to(SheetStatus::Graded));
        assert!(SheetStatus::Graded.can_transition_to(SheetStatus::Graded));
        assert!(SheetStatus::Graded.can_transition_to(SheetStatus::Reviewed));

        assert!(!SheetStatus::InProgress.can_transition_to(SheetStatus::Reviewed));
        assert!(!SheetStatus::Reviewed.can_transition_to(SheetStatus::Graded));
        assert!(!SheetStatus::Reviewed.can_transition_to(SheetStatus::InProgress));
        assert!(!SheetStatus::Graded.can_transition_to(SheetStatus::InProgress));
    }

    #[test]
    fn enums_round_trip_through_their_text_form() {
        for status in [
            SheetStatus::InProgress,
            SheetStatus::Graded,
            SheetStatus::Reviewed,
        ] {
            assert_eq!(status.as_str().parse::<SheetStatus>().unwrap(), status);
        }
        for difficulty in [
            QuizDifficulty::Easy,
            QuizDifficulty::Medium,
            QuizDifficulty::Hard,
            QuizDifficulty::Random,
        ] {
            assert_eq!(
                difficulty.as_str().parse::<QuizDifficulty>().unwrap(),
                difficulty
            );
        }
        assert!("finished".parse::<SheetStatus>().is_err());
        assert!("extreme".parse::<QuizDifficulty>().is_err());
    }

    #[test]
    fn random_difficulty_means_no_pool_filter() {
        assert_eq!(QuizDifficulty::Random.problem_filter(), None);
        assert_eq!(
            QuizDifficulty::Hard.problem_filter(),
            Some(Difficulty::Hard)
        );
    }
}
