use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use crate::error::ApiError;
use crate::model::{AnswerSheet, Quiz, SheetStatus};
use crate::schema::{answer_sheets, problems_in_quizzes, quizzes, user_answers, user_problem_stats};
use crate::{utils, DbPool};

#[derive(Debug, Deserialize)]
pub struct AnswerCreate {
    pub problem_id: i32,
    #[serde(default)]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub is_starred: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveAnswersRequest {
    pub answers: Vec<AnswerCreate>,
    pub passed_time: f64,
}

#[derive(Serialize)]
pub struct SaveAnswersData {
    pub answer_sheet_id: i32,
}

#[derive(Serialize)]
pub struct SaveAnswersResponse {
    pub success: bool,
    pub data: SaveAnswersData,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StarUpdate {
    pub is_starred: bool,
}

#[derive(Serialize)]
pub struct StarredProblem {
    pub problem_id: i32,
    pub is_starred: bool,
}

#[derive(Serialize)]
pub struct StarredProblemsResponse {
    pub starred_problems: Vec<StarredProblem>,
}

/// Saves a user's in-progress answers for a quiz.
///
/// Exactly one answer sheet exists per (quiz, user); resubmitting the same
/// payload is idempotent. Everything commits in one transaction.
pub fn save_answers(
    conn: &mut SqliteConnection,
    quiz_id: i32,
    user_id: i32,
    req: &SaveAnswersRequest,
) -> Result<i32, ApiError> {
    log::debug!(
        "Saving {} answers for quiz {} from user {}",
        req.answers.len(),
        quiz_id,
        user_id
    );

    if req.passed_time < 0.0 {
        return Err(ApiError::validation(
            "VALIDATION_ERROR",
            "passed_time must not be negative.",
            json!({ "passed_time": req.passed_time }),
        ));
    }

    let quiz = quizzes::table
        .filter(quizzes::id.eq(quiz_id))
        .filter(quizzes::user_id.eq(user_id))
        .filter(quizzes::status.eq(SheetStatus::InProgress))
        .filter(quizzes::deleted_at.is_null())
        .first::<Quiz>(conn)
        .optional()?
        .ok_or_else(|| {
            log::error!(
                "Quiz not found or not in progress. Quiz ID: {}, User ID: {}",
                quiz_id,
                user_id
            );
            ApiError::validation(
                "INVALID_QUIZ",
                "Quiz not found or not in progress",
                json!({
                    "quiz_id": format!("Quiz {} is either invalid or not in progress", quiz_id)
                }),
            )
        })?;

    let linked: Vec<i32> = problems_in_quizzes::table
        .filter(problems_in_quizzes::quiz_id.eq(quiz_id))
        .select(problems_in_quizzes::problem_id)
        .load(conn)?;
    for answer in &req.answers {
        if !linked.contains(&answer.problem_id) {
            return Err(ApiError::validation(
                "PROBLEM_NOT_IN_QUIZ",
                format!(
                    "Problem {} is not part of quiz {}.",
                    answer.problem_id, quiz_id
                ),
                json!({ "problem_id": answer.problem_id, "quiz_id": quiz_id }),
            ));
        }
    }

    let now = Utc::now().naive_utc();
    let passed_time = req.passed_time as i32;

    let sheet_id = conn.transaction::<i32, ApiError, _>(|conn| {
        diesel::insert_into(answer_sheets::table)
            .values((
                answer_sheets::quiz_id.eq(quiz_id),
                answer_sheets::user_id.eq(user_id),
                answer_sheets::status.eq(SheetStatus::InProgress),
                answer_sheets::passed_time.eq(passed_time),
                answer_sheets::unanswered_count.eq(quiz.total_problems_count),
                answer_sheets::created_at.eq(now),
            ))
            .on_conflict((answer_sheets::quiz_id, answer_sheets::user_id))
            .do_update()
            .set((
                answer_sheets::passed_time.eq(passed_time),
                answer_sheets::updated_at.eq(now),
            ))
            .execute(conn)?;

        let sheet_id: i32 = answer_sheets::table
            .filter(answer_sheets::quiz_id.eq(quiz_id))
            .filter(answer_sheets::user_id.eq(user_id))
            .select(answer_sheets::id)
            .first(conn)?;

        for answer in &req.answers {
            let has_answer = answer.selected_option.is_some();
            diesel::insert_into(user_answers::table)
                .values((
                    user_answers::answer_sheet_id.eq(sheet_id),
                    user_answers::problem_id.eq(answer.problem_id),
                    user_answers::user_answer.eq(answer.selected_option.as_deref()),
                    user_answers::is_correct.eq(false),
                    user_answers::is_starred.eq(answer.is_starred),
                    user_answers::has_answer.eq(has_answer),
                    user_answers::created_at.eq(now),
                ))
                .on_conflict((user_answers::answer_sheet_id, user_answers::problem_id))
                .do_update()
                .set((
                    user_answers::user_answer.eq(answer.selected_option.as_deref()),
                    user_answers::is_starred.eq(answer.is_starred),
                    user_answers::has_answer.eq(has_answer),
                    user_answers::updated_at.eq(now),
                ))
                .execute(conn)?;
        }

        let answered: i64 = user_answers::table
            .filter(user_answers::answer_sheet_id.eq(sheet_id))
            .filter(user_answers::has_answer.eq(true))
            .count()
            .get_result(conn)?;
        diesel::update(answer_sheets::table.find(sheet_id))
            .set(answer_sheets::unanswered_count.eq(quiz.total_problems_count - answered as i32))
            .execute(conn)?;

        Ok(sheet_id)
    })?;

    log::debug!("Answer sheet {} saved for quiz {}", sheet_id, quiz_id);
    Ok(sheet_id)
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

/// Flips the star flag for one problem on an answer sheet. Never touches the
/// stored answer or `has_answer`.
pub fn set_star(
    conn: &mut SqliteConnection,
    sheet_id: i32,
    user_id: i32,
    problem_id: i32,
    is_starred: bool,
) -> Result<(), ApiError> {
    let sheet = find_owned_sheet(conn, sheet_id, user_id)?;

    let in_quiz: i64 = problems_in_quizzes::table
        .filter(problems_in_quizzes::quiz_id.eq(sheet.quiz_id))
        .filter(problems_in_quizzes::problem_id.eq(problem_id))
        .count()
        .get_result(conn)?;
    if in_quiz == 0 {
        return Err(ApiError::validation(
            "PROBLEM_NOT_IN_QUIZ",
            format!(
                "Problem {} is not part of quiz {}.",
                problem_id, sheet.quiz_id
            ),
            json!({ "problem_id": problem_id, "quiz_id": sheet.quiz_id }),
        ));
    }

    let now = Utc::now().naive_utc();
    conn.transaction::<(), ApiError, _>(|conn| {
        diesel::insert_into(user_answers::table)
            .values((
                user_answers::answer_sheet_id.eq(sheet_id),
                user_answers::problem_id.eq(problem_id),
                user_answers::user_answer.eq(None::<String>),
                user_answers::is_correct.eq(false),
                user_answers::is_starred.eq(is_starred),
                user_answers::has_answer.eq(false),
                user_answers::created_at.eq(now),
            ))
            .on_conflict((user_answers::answer_sheet_id, user_answers::problem_id))
            .do_update()
            .set((
                user_answers::is_starred.eq(is_starred),
                user_answers::updated_at.eq(now),
            ))
            .execute(conn)?;

        // Mirror the flag into the lifetime per-user stat row.
        diesel::insert_into(user_problem_stats::table)
            .values((
                user_problem_stats::user_id.eq(user_id),
                user_problem_stats::problem_id.eq(problem_id),
                user_problem_stats::is_starred.eq(is_starred),
                user_problem_stats::correct_attempts_count.eq(0),
                user_problem_stats::total_attempts_count.eq(0),
                user_problem_stats::created_at.eq(now),
            ))
            .on_conflict((user_problem_stats::user_id, user_problem_stats::problem_id))
            .do_update()
            .set((
                user_problem_stats::is_starred.eq(is_starred),
                user_problem_stats::updated_at.eq(now),
            ))
            .execute(conn)?;

        Ok(())
    })
}

/// Starred problems on a sheet. An empty list is a normal result, not an
/// error.
pub fn get_starred(
    conn: &mut SqliteConnection,
    sheet_id: i32,
    user_id: i32,
) -> Result<Vec<StarredProblem>, ApiError> {
    find_owned_sheet(conn, sheet_id, user_id)?;

    let starred = user_answers::table
        .filter(user_answers::answer_sheet_id.eq(sheet_id))
        .filter(user_answers::is_starred.eq(true))
        .order(user_answers::problem_id.asc())
        .select((user_answers::problem_id, user_answers::is_starred))
        .load::<(i32, bool)>(conn)?
        .into_iter()
        .map(|(problem_id, is_starred)| StarredProblem {
            problem_id,
            is_starred,
        })
        .collect();
    Ok(starred)
}

pub async fn save_answers_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Path(quiz_id): Path<i32>,
    Json(payload): Json<SaveAnswersRequest>,
) -> Result<(StatusCode, Json<SaveAnswersResponse>), ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let answer_sheet_id = save_answers(&mut conn, quiz_id, user_id, &payload)?;

    Ok((
        StatusCode::CREATED,
        Json(SaveAnswersResponse {
            success: true,
            data: SaveAnswersData { answer_sheet_id },
            message: "Answers saved successfully".to_string(),
        }),
    ))
}

pub async fn set_star_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Path((sheet_id, problem_id)): Path<(i32, i32)>,
    Json(payload): Json<StarUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    set_star(&mut conn, sheet_id, user_id, problem_id, payload.is_starred)?;
    Ok(Json(json!({ "message": "Star status updated successfully" })))
}

pub async fn get_starred_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Path(sheet_id): Path<i32>,
) -> Result<Json<StarredProblemsResponse>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let starred_problems = get_starred(&mut conn, sheet_id, user_id)?;
    Ok(Json(StarredProblemsResponse { starred_problems }))
}

/// Routes nested under `/api/problems`.
pub fn save_router(pool: DbPool) -> Router {
    Router::new()
        .route("/{quiz_id}/answer", post(save_answers_endpoint))
        .with_state(pool)
}

/// Routes nested under `/api/answers`.
pub fn star_router(pool: DbPool) -> Router {
    Router::new()
        .route(
            "/{sheet_id}/problems/{problem_id}/star",
            post(set_star_endpoint),
        )
        .route("/{sheet_id}/star", get(get_starred_endpoint))
        .with_state(pool)
}
