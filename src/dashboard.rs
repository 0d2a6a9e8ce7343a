use std::collections::{HashMap, HashSet};

use axum::extract::{Json, Query, State};
use axum::routing::get;
use axum::Router;
use chrono::{NaiveDate, NaiveTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use crate::error::ApiError;
use crate::model::{AnswerSheet, Quiz, SheetStatus};
use crate::schema::{answer_sheets, chapters, problems, quizzes, study_logs, user_answers};
use crate::{utils, DbPool};

#[derive(Serialize, Debug)]
pub struct QuizInfo {
    pub quiz_id: i32,
    pub title: String,
    pub status: SheetStatus,
}

#[derive(Serialize, Debug)]
pub struct StudyRecordDay {
    pub date: NaiveDate,
    pub has_study: bool,
    pub quizzes: Vec<QuizInfo>,
}

#[derive(Serialize, Debug)]
pub struct CalendarStudyRecordsResponse {
    pub study_records: Vec<StudyRecordDay>,
}

#[derive(Deserialize)]
pub struct CalendarParams {
    pub year: i32,
    pub month: u32,
}

#[derive(Serialize)]
pub struct InProgressAnswerSheet {
    pub answer_sheet_id: i32,
    pub quiz_title: String,
    pub progress_rate: f64,
    pub study_date: NaiveDate,
}

#[derive(Serialize)]
pub struct InProgressAnswerSheetResponse {
    pub answer_sheets: Vec<InProgressAnswerSheet>,
}

#[derive(Serialize)]
pub struct ChapterStat {
    pub chapter_id: i32,
    pub chapter_name: String,
    pub solved_count: i64,
    pub correct_count: i64,
    pub accuracy_rate: f64,
}

#[derive(Serialize)]
pub struct ChapterStatisticsResponse {
    pub chapters: Vec<ChapterStat>,
    pub total_solved_count: i64,
    pub total_correct_count: i64,
    pub overall_accuracy_rate: f64,
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

fn accuracy(correct: i64, solved: i64) -> f64 {
    if solved > 0 {
        correct as f64 / solved as f64 * 100.0
    } else {
        0.0
    }
}

/// One record per calendar day of the month: whether the user studied that
/// day, and the quizzes created that day with their latest sheet status.
pub fn get_calendar_study_records(
    conn: &mut SqliteConnection,
    user_id: i32,
    year: i32,
    month: u32,
) -> Result<CalendarStudyRecordsResponse, ApiError> {
    if !(1..=12).contains(&month) {
        return Err(ApiError::validation(
            "VALIDATION_ERROR",
            "Month must be between 1 and 12.",
            json!({ "month": month }),
        ));
    }
    let last_day = days_in_month(year, month).ok_or_else(|| {
        ApiError::validation(
            "VALIDATION_ERROR",
            "Invalid year/month combination.",
            json!({ "year": year, "month": month }),
        )
    })?;

    let month_start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ApiError::Unexpected(format!("invalid month start {}-{}", year, month)))?;
    let next_month_start = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| ApiError::Unexpected(format!("invalid month end {}-{}", year, month)))?;

    let study_days: HashSet<NaiveDate> = study_logs::table
        .filter(study_logs::user_id.eq(user_id))
        .filter(study_logs::quiz_date.ge(month_start))
        .filter(study_logs::quiz_date.lt(next_month_start))
        .select(study_logs::quiz_date)
        .load::<NaiveDate>(conn)?
        .into_iter()
        .collect();

    let month_quizzes: Vec<Quiz> = quizzes::table
        .filter(quizzes::user_id.eq(user_id))
        .filter(quizzes::deleted_at.is_null())
        .filter(quizzes::created_at.ge(month_start.and_time(NaiveTime::MIN)))
        .filter(quizzes::created_at.lt(next_month_start.and_time(NaiveTime::MIN)))
        .order(quizzes::created_at.asc())
        .load(conn)?;

    let quiz_ids: Vec<i32> = month_quizzes.iter().map(|q| q.id).collect();
    // Latest sheet per quiz; ascending order means later rows overwrite.
    let mut latest_sheet_status: HashMap<i32, SheetStatus> = HashMap::new();
    let sheets: Vec<AnswerSheet> = answer_sheets::table
        .filter(answer_sheets::quiz_id.eq_any(&quiz_ids))
        .filter(answer_sheets::deleted_at.is_null())
        .order(answer_sheets::created_at.asc())
        .load(conn)?;
    for sheet in sheets {
        latest_sheet_status.insert(sheet.quiz_id, sheet.status);
    }

    let mut quizzes_by_day: HashMap<NaiveDate, Vec<QuizInfo>> = HashMap::new();
    for quiz in month_quizzes {
        let status = latest_sheet_status
            .get(&quiz.id)
            .copied()
            .unwrap_or(SheetStatus::InProgress);
        quizzes_by_day
            .entry(quiz.created_at.date())
            .or_default()
            .push(QuizInfo {
                quiz_id: quiz.id,
                title: quiz.title,
                status,
            });
    }

    let study_records = (1..=last_day)
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .map(|date| StudyRecordDay {
            date,
            has_study: study_days.contains(&date),
            quizzes: quizzes_by_day.remove(&date).unwrap_or_default(),
        })
        .collect();

    Ok(CalendarStudyRecordsResponse { study_records })
}

/// The user's unfinished answer sheets with how far along each one is.
pub fn get_in_progress_sheets(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Vec<InProgressAnswerSheet>, ApiError> {
    let sheets: Vec<AnswerSheet> = answer_sheets::table
        .filter(answer_sheets::user_id.eq(user_id))
        .filter(answer_sheets::status.eq(SheetStatus::InProgress))
        .filter(answer_sheets::deleted_at.is_null())
        .order(answer_sheets::created_at.desc())
        .load(conn)?;

    let quiz_ids: Vec<i32> = sheets.iter().map(|s| s.quiz_id).collect();
    let quiz_meta: HashMap<i32, (String, i32)> = quizzes::table
        .filter(quizzes::id.eq_any(&quiz_ids))
        .select((quizzes::id, quizzes::title, quizzes::total_problems_count))
        .load::<(i32, String, i32)>(conn)?
        .into_iter()
        .map(|(id, title, total)| (id, (title, total)))
        .collect();

    let sheet_ids: Vec<i32> = sheets.iter().map(|s| s.id).collect();
    let mut answered_per_sheet: HashMap<i32, i64> = HashMap::new();
    let answered_rows: Vec<i32> = user_answers::table
        .filter(user_answers::answer_sheet_id.eq_any(&sheet_ids))
        .filter(user_answers::has_answer.eq(true))
        .select(user_answers::answer_sheet_id)
        .load(conn)?;
    for sheet_id in answered_rows {
        *answered_per_sheet.entry(sheet_id).or_insert(0) += 1;
    }

    let result = sheets
        .into_iter()
        .filter_map(|sheet| {
            let (title, total) = quiz_meta.get(&sheet.quiz_id)?.clone();
            let answered = answered_per_sheet.get(&sheet.id).copied().unwrap_or(0);
            Some(InProgressAnswerSheet {
                answer_sheet_id: sheet.id,
                quiz_title: title,
                progress_rate: accuracy(answered, i64::from(total)),
                study_date: sheet.created_at.date(),
            })
        })
        .collect();
    Ok(result)
}

/// Per-chapter and overall accuracy across the user's graded sheets.
/// Reviewed sheets keep their grading data, so they count too.
pub fn get_chapter_statistics(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<ChapterStatisticsResponse, ApiError> {
    let graded_sheet_ids: Vec<i32> = answer_sheets::table
        .filter(answer_sheets::user_id.eq(user_id))
        .filter(answer_sheets::status.ne(SheetStatus::InProgress))
        .filter(answer_sheets::deleted_at.is_null())
        .select(answer_sheets::id)
        .load(conn)?;

    let answers: Vec<(i32, bool)> = user_answers::table
        .filter(user_answers::answer_sheet_id.eq_any(&graded_sheet_ids))
        .select((user_answers::problem_id, user_answers::is_correct))
        .load(conn)?;

    let problem_ids: Vec<i32> = answers.iter().map(|(id, _)| *id).collect();
    let problem_chapters: HashMap<i32, i32> = problems::table
        .filter(problems::id.eq_any(&problem_ids))
        .select((problems::id, problems::chapter_id))
        .load::<(i32, i32)>(conn)?
        .into_iter()
        .collect();

    // chapter id -> (solved, correct)
    let mut per_chapter: HashMap<i32, (i64, i64)> = HashMap::new();
    let mut total_solved = 0;
    let mut total_correct = 0;
    for (problem_id, is_correct) in answers {
        let Some(chapter_id) = problem_chapters.get(&problem_id) else {
            continue;
        };
        let entry = per_chapter.entry(*chapter_id).or_insert((0, 0));
        entry.0 += 1;
        total_solved += 1;
        if is_correct {
            entry.1 += 1;
            total_correct += 1;
        }
    }

    let chapter_ids: Vec<i32> = per_chapter.keys().copied().collect();
    let chapter_names: HashMap<i32, String> = chapters::table
        .filter(chapters::id.eq_any(&chapter_ids))
        .select((chapters::id, chapters::name))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();

    let mut chapters_out: Vec<ChapterStat> = per_chapter
        .into_iter()
        .map(|(chapter_id, (solved, correct))| ChapterStat {
            chapter_id,
            chapter_name: chapter_names
                .get(&chapter_id)
                .cloned()
                .unwrap_or_default(),
            solved_count: solved,
            correct_count: correct,
            accuracy_rate: accuracy(correct, solved),
        })
        .collect();
    chapters_out.sort_by_key(|c| c.chapter_id);

    Ok(ChapterStatisticsResponse {
        chapters: chapters_out,
        total_solved_count: total_solved,
        total_correct_count: total_correct,
        overall_accuracy_rate: accuracy(total_correct, total_solved),
    })
}

pub async fn calendar_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Query(params): Query<CalendarParams>,
) -> Result<Json<CalendarStudyRecordsResponse>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let records = get_calendar_study_records(&mut conn, user_id, params.year, params.month)?;
    Ok(Json(records))
}

pub async fn in_progress_endpoint(
    State(pool): State<DbPool>,
    session: Session,
) -> Result<Json<InProgressAnswerSheetResponse>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let answer_sheets = get_in_progress_sheets(&mut conn, user_id)?;
    Ok(Json(InProgressAnswerSheetResponse { answer_sheets }))
}

pub async fn chapter_statistics_endpoint(
    State(pool): State<DbPool>,
    session: Session,
) -> Result<Json<ChapterStatisticsResponse>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let stats = get_chapter_statistics(&mut conn, user_id)?;
    Ok(Json(stats))
}

pub fn router(pool: DbPool) -> Router {
    Router::new()
        .route("/calendars/study-records", get(calendar_endpoint))
        .route("/answer-sheets/in-progress", get(in_progress_endpoint))
        .route("/statistics/chapters", get(chapter_statistics_endpoint))
        .with_state(pool)
}
