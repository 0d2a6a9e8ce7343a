use std::collections::{HashMap, HashSet};

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use crate::error::ApiError;
use crate::model::{AnswerSheet, GradeVerdict, Quiz, QuizDifficulty, SheetStatus};
use crate::quiz::Pagination;
use crate::schema::{
    answer_sheets, chapters, grading_results, problems, problems_in_quizzes, quizzes,
    user_answers, user_problem_stats, users,
};
use crate::{utils, DbPool};

#[derive(Debug, Deserialize)]
pub struct AnswerGrade {
    pub problem_id: i32,
    /// Accepted as a raw JSON value so `2` and `"2"` grade identically.
    #[serde(default)]
    pub selected_option: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub answers: Vec<AnswerGrade>,
}

#[derive(Serialize, Debug)]
pub struct GradeResult {
    pub score: f64,
    pub correct_count: i32,
    pub total_questions: i32,
}

#[derive(Serialize, Debug)]
pub struct GradingResultItem {
    pub problem_id: i32,
    pub problem_number: i32,
    pub user_answer: Option<String>,
    pub correct_answer: String,
    pub result: Option<GradeVerdict>,
    pub is_starred: bool,
}

#[derive(Serialize, Debug)]
pub struct GradingSummary {
    pub total_questions: i64,
    pub correct_count: i64,
    pub chapter_name: String,
    pub difficulty: QuizDifficulty,
    pub passed_time: String,
}

#[derive(Serialize, Debug)]
pub struct GradingResultData {
    pub answer_sheet_id: i32,
    pub summary: GradingSummary,
    pub results: Vec<GradingResultItem>,
    pub pagination: Pagination,
}

#[derive(Deserialize)]
pub struct GradePageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    6
}

/// Trimmed string form of a submitted option, whatever JSON type it arrived
/// as. `null` means unanswered.
fn normalize_option(value: Option<&serde_json::Value>) -> Result<Option<String>, ApiError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ApiError::validation(
            "VALIDATION_ERROR",
            "selected_option must be a string, a number, or null.",
            json!({ "selected_option": other }),
        )),
    }
}

fn find_owned_sheet(
    conn: &mut SqliteConnection,
    sheet_id: i32,
    user_id: i32,
) -> Result<AnswerSheet, ApiError> {
    answer_sheets::table
        .filter(answer_sheets::id.eq(sheet_id))
        .filter(answer_sheets::user_id.eq(user_id))
        .filter(answer_sheets::deleted_at.is_null())
        .first::<AnswerSheet>(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(format!("Answer sheet {} not found", sheet_id)))
}

/// Grades an answer sheet against the stored correct answers.
///
/// The payload must cover every problem linked to the quiz exactly once;
/// anything else would silently under-count the score. Regrading a graded
/// sheet overwrites the previous verdicts. All writes, including the status
/// transition and the per-user counters, commit in one transaction.
pub fn grade_answer_sheet(
    conn: &mut SqliteConnection,
    sheet_id: i32,
    user_id: i32,
    req: &GradeRequest,
) -> Result<GradeResult, ApiError> {
    let sheet = find_owned_sheet(conn, sheet_id, user_id)?;

    if !sheet.status.can_transition_to(SheetStatus::Graded) {
        return Err(ApiError::validation(
            "INVALID_SHEET_STATUS",
            format!(
                "Answer sheet {} cannot be graded from status {}.",
                sheet_id, sheet.status
            ),
            json!({ "status": sheet.status.as_str() }),
        ));
    }

    let quiz = quizzes::table
        .filter(quizzes::id.eq(sheet.quiz_id))
        .filter(quizzes::deleted_at.is_null())
        .first::<Quiz>(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(format!("Quiz {} not found", sheet.quiz_id)))?;

    let linked: HashSet<i32> = problems_in_quizzes::table
        .filter(problems_in_quizzes::quiz_id.eq(quiz.id))
        .select(problems_in_quizzes::problem_id)
        .load::<i32>(conn)?
        .into_iter()
        .collect();

    let mut submitted = HashSet::with_capacity(req.answers.len());
    for answer in &req.answers {
        if !linked.contains(&answer.problem_id) {
            return Err(ApiError::validation(
                "PROBLEM_NOT_IN_QUIZ",
                format!(
                    "Problem {} is not part of quiz {}.",
                    answer.problem_id, quiz.id
                ),
                json!({ "problem_id": answer.problem_id, "quiz_id": quiz.id }),
            ));
        }
        if !submitted.insert(answer.problem_id) {
            return Err(ApiError::validation(
                "VALIDATION_ERROR",
                format!("Problem {} appears more than once in the payload.", answer.problem_id),
                json!({ "problem_id": answer.problem_id }),
            ));
        }
    }

    let missing: Vec<i32> = linked.difference(&submitted).copied().collect();
    if !missing.is_empty() {
        let mut missing = missing;
        missing.sort();
        return Err(ApiError::validation(
            "INCOMPLETE_SUBMISSION",
            "Every problem in the quiz must be answered (or explicitly left blank) when grading.",
            json!({ "missing_problem_ids": missing }),
        ));
    }

    let total_questions = quiz.total_problems_count;
    let now = Utc::now().naive_utc();
    let first_transition = sheet.status == SheetStatus::InProgress;

    let submitted_ids: Vec<i32> = submitted.iter().copied().collect();
    let correct_count = conn.transaction::<i32, ApiError, _>(|conn| {
        let correct_answers: HashMap<i32, String> = problems::table
            .filter(problems::id.eq_any(&submitted_ids))
            .select((problems::id, problems::correct_answer))
            .load::<(i32, String)>(conn)?
            .into_iter()
            .collect();

        let mut correct_count = 0;
        let mut unanswered = 0;
        for answer in &req.answers {
            let correct_answer = correct_answers.get(&answer.problem_id).ok_or_else(|| {
                ApiError::not_found(format!("Problem {} not found", answer.problem_id))
            })?;

            let selected = normalize_option(answer.selected_option.as_ref())?;
            let has_answer = selected.is_some();
            if !has_answer {
                unanswered += 1;
            }
            let is_correct = selected.as_deref() == Some(correct_answer.trim());
            if is_correct {
                correct_count += 1;
            }

            diesel::insert_into(user_answers::table)
                .values((
                    user_answers::answer_sheet_id.eq(sheet_id),
                    user_answers::problem_id.eq(answer.problem_id),
                    user_answers::user_answer.eq(selected.as_deref()),
                    user_answers::is_correct.eq(is_correct),
                    user_answers::is_starred.eq(false),
                    user_answers::has_answer.eq(has_answer),
                    user_answers::created_at.eq(now),
                ))
                .on_conflict((user_answers::answer_sheet_id, user_answers::problem_id))
                .do_update()
                .set((
                    user_answers::user_answer.eq(selected.as_deref()),
                    user_answers::is_correct.eq(is_correct),
                    user_answers::has_answer.eq(has_answer),
                    user_answers::updated_at.eq(now),
                ))
                .execute(conn)?;

            let verdict = GradeVerdict::from_is_correct(is_correct);
            diesel::insert_into(grading_results::table)
                .values((
                    grading_results::answer_sheet_id.eq(sheet_id),
                    grading_results::problem_id.eq(answer.problem_id),
                    grading_results::result.eq(verdict),
                    grading_results::created_at.eq(now),
                ))
                .on_conflict((
                    grading_results::answer_sheet_id,
                    grading_results::problem_id,
                ))
                .do_update()
                .set((
                    grading_results::result.eq(verdict),
                    grading_results::updated_at.eq(now),
                ))
                .execute(conn)?;

            // Lifetime counters: every grading call counts as an attempt.
            diesel::update(problems::table.find(answer.problem_id))
                .set(problems::attempt_count.eq(problems::attempt_count + 1))
                .execute(conn)?;
            if is_correct {
                diesel::update(problems::table.find(answer.problem_id))
                    .set(problems::correct_count.eq(problems::correct_count + 1))
                    .execute(conn)?;
            }

            let correct_delta = if is_correct { 1 } else { 0 };
            diesel::insert_into(user_problem_stats::table)
                .values((
                    user_problem_stats::user_id.eq(user_id),
                    user_problem_stats::problem_id.eq(answer.problem_id),
                    user_problem_stats::is_starred.eq(false),
                    user_problem_stats::correct_attempts_count.eq(correct_delta),
                    user_problem_stats::total_attempts_count.eq(1),
                    user_problem_stats::created_at.eq(now),
                ))
                .on_conflict((
                    user_problem_stats::user_id,
                    user_problem_stats::problem_id,
                ))
                .do_update()
                .set((
                    user_problem_stats::correct_attempts_count
                        .eq(user_problem_stats::correct_attempts_count + correct_delta),
                    user_problem_stats::total_attempts_count
                        .eq(user_problem_stats::total_attempts_count + 1),
                    user_problem_stats::updated_at.eq(now),
                ))
                .execute(conn)?;
        }

        diesel::update(answer_sheets::table.find(sheet_id))
            .set((
                answer_sheets::status.eq(SheetStatus::Graded),
                answer_sheets::unanswered_count.eq(unanswered),
                answer_sheets::updated_at.eq(now),
            ))
            .execute(conn)?;
        diesel::update(quizzes::table.find(quiz.id))
            .set((
                quizzes::status.eq(SheetStatus::Graded),
                quizzes::updated_at.eq(now),
            ))
            .execute(conn)?;

        if first_transition {
            diesel::update(users::table.find(user_id))
                .set((
                    users::ongoing_quizzes_count.eq(users::ongoing_quizzes_count - 1),
                    users::graded_quizzes_count.eq(users::graded_quizzes_count + 1),
                ))
                .execute(conn)?;
        }

        Ok(correct_count)
    })?;

    let score = if total_questions > 0 {
        f64::from(correct_count) / f64::from(total_questions) * 100.0
    } else {
        0.0
    };
    log::info!(
        "Graded answer sheet {}: {}/{} correct",
        sheet_id,
        correct_count,
        total_questions
    );

    Ok(GradeResult {
        score,
        correct_count,
        total_questions,
    })
}

/// Marks a graded sheet (and its quiz) as reviewed.
pub fn complete_review(
    conn: &mut SqliteConnection,
    sheet_id: i32,
    user_id: i32,
) -> Result<(), ApiError> {
    let sheet = find_owned_sheet(conn, sheet_id, user_id)?;

    if !sheet.status.can_transition_to(SheetStatus::Reviewed) {
        return Err(ApiError::validation(
            "INVALID_SHEET_STATUS",
            format!(
                "Answer sheet {} cannot be reviewed from status {}.",
                sheet_id, sheet.status
            ),
            json!({ "status": sheet.status.as_str() }),
        ));
    }

    let now = Utc::now().naive_utc();
    conn.transaction::<(), ApiError, _>(|conn| {
        diesel::update(answer_sheets::table.find(sheet_id))
            .set((
                answer_sheets::status.eq(SheetStatus::Reviewed),
                answer_sheets::updated_at.eq(now),
            ))
            .execute(conn)?;
        diesel::update(quizzes::table.find(sheet.quiz_id))
            .set((
                quizzes::status.eq(SheetStatus::Reviewed),
                quizzes::updated_at.eq(now),
            ))
            .execute(conn)?;
        diesel::update(users::table.find(user_id))
            .set((
                users::graded_quizzes_count.eq(users::graded_quizzes_count - 1),
                users::review_completed_quizzes_count
                    .eq(users::review_completed_quizzes_count + 1),
            ))
            .execute(conn)?;
        Ok(())
    })
}

/// One page of per-problem grading results plus a sheet-wide summary.
///
/// The summary counts correct answers across the whole sheet, never just the
/// current page.
pub fn get_grading_results(
    conn: &mut SqliteConnection,
    sheet_id: i32,
    user_id: i32,
    page: i64,
    page_size: i64,
) -> Result<GradingResultData, ApiError> {
    if page < 1 || page_size < 1 {
        return Err(ApiError::validation(
            "VALIDATION_ERROR",
            "Page and page_size must both be at least 1.",
            json!({ "page": page, "page_size": page_size }),
        ));
    }

    let sheet = find_owned_sheet(conn, sheet_id, user_id)?;

    let quiz = quizzes::table
        .filter(quizzes::id.eq(sheet.quiz_id))
        .filter(quizzes::deleted_at.is_null())
        .first::<Quiz>(conn)?;
    let chapter_name: String = chapters::table
        .find(quiz.chapter_id)
        .select(chapters::name)
        .first(conn)?;

    let links: Vec<(i32, i32)> = problems_in_quizzes::table
        .filter(problems_in_quizzes::quiz_id.eq(quiz.id))
        .order(problems_in_quizzes::problem_number.asc())
        .select((
            problems_in_quizzes::problem_number,
            problems_in_quizzes::problem_id,
        ))
        .load(conn)?;

    let total_questions = links.len() as i64;
    if total_questions == 0 {
        return Err(ApiError::Unexpected(format!(
            "Quiz {} has no linked problems",
            quiz.id
        )));
    }

    let total_pages = (total_questions + page_size - 1) / page_size;
    if page > total_pages {
        return Err(ApiError::validation(
            "INVALID_PAGE",
            format!("Page {} is out of range; the last page is {}.", page, total_pages),
            json!({ "page": page, "total_pages": total_pages }),
        ));
    }

    let correct_count: i64 = grading_results::table
        .filter(grading_results::answer_sheet_id.eq(sheet_id))
        .filter(grading_results::result.eq(GradeVerdict::Correct))
        .count()
        .get_result(conn)?;

    let page_links: Vec<(i32, i32)> = links
        .into_iter()
        .skip(((page - 1) * page_size) as usize)
        .take(page_size as usize)
        .collect();
    let page_ids: Vec<i32> = page_links.iter().map(|(_, id)| *id).collect();

    let answers: HashMap<i32, (Option<String>, bool)> = user_answers::table
        .filter(user_answers::answer_sheet_id.eq(sheet_id))
        .filter(user_answers::problem_id.eq_any(&page_ids))
        .select((
            user_answers::problem_id,
            user_answers::user_answer,
            user_answers::is_starred,
        ))
        .load::<(i32, Option<String>, bool)>(conn)?
        .into_iter()
        .map(|(id, ua, starred)| (id, (ua, starred)))
        .collect();

    let verdicts: HashMap<i32, GradeVerdict> = grading_results::table
        .filter(grading_results::answer_sheet_id.eq(sheet_id))
        .filter(grading_results::problem_id.eq_any(&page_ids))
        .select((grading_results::problem_id, grading_results::result))
        .load::<(i32, GradeVerdict)>(conn)?
        .into_iter()
        .collect();

    let correct_answers: HashMap<i32, String> = problems::table
        .filter(problems::id.eq_any(&page_ids))
        .select((problems::id, problems::correct_answer))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();

    let results = page_links
        .into_iter()
        .map(|(problem_number, problem_id)| {
            let (user_answer, is_starred) = answers
                .get(&problem_id)
                .cloned()
                .unwrap_or((None, false));
            GradingResultItem {
                problem_id,
                problem_number,
                user_answer,
                correct_answer: correct_answers
                    .get(&problem_id)
                    .cloned()
                    .unwrap_or_default(),
                result: verdicts.get(&problem_id).copied(),
                is_starred,
            }
        })
        .collect();

    Ok(GradingResultData {
        answer_sheet_id: sheet_id,
        summary: GradingSummary {
            total_questions,
            correct_count,
            chapter_name,
            difficulty: quiz.difficulty,
            passed_time: utils::format_passed_time(sheet.passed_time.unwrap_or(0)),
        },
        results,
        pagination: Pagination {
            current_page: page,
            total_pages,
            limit: page_size,
            total_questions,
        },
    })
}

pub async fn grade_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Path(sheet_id): Path<i32>,
    Json(payload): Json<GradeRequest>,
) -> Result<(StatusCode, Json<GradeResult>), ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let result = grade_answer_sheet(&mut conn, sheet_id, user_id, &payload)?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn grading_results_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Path(sheet_id): Path<i32>,
    Query(params): Query<GradePageParams>,
) -> Result<Json<GradingResultData>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let data = get_grading_results(&mut conn, sheet_id, user_id, params.page, params.page_size)?;
    Ok(Json(data))
}

pub async fn complete_review_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Path(sheet_id): Path<i32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    complete_review(&mut conn, sheet_id, user_id)?;
    Ok(Json(json!({ "message": "Review completed" })))
}

/// Routes nested under `/api/answers`.
pub fn router(pool: DbPool) -> Router {
    Router::new()
        .route(
            "/{sheet_id}/grade",
            post(grade_endpoint).get(grading_results_endpoint),
        )
        .route("/{sheet_id}/review", post(complete_review_endpoint))
        .with_state(pool)
}
