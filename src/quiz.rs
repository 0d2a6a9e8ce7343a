use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use diesel::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use crate::error::ApiError;
use crate::model::{Chapter, NewProblemInQuiz, NewQuiz, Quiz, QuizDifficulty, SheetStatus};
use crate::schema::{chapters, problems, problems_in_quizzes, quizzes, study_logs, users};
use crate::{utils, DbPool};

pub const ALLOWED_PROBLEM_COUNTS: [i32; 4] = [5, 10, 20, 30];

#[derive(Debug, Deserialize)]
pub struct QuizCreateRequest {
    pub chapter_id: i32,
    pub question_count: i32,
    pub difficulty: String,
}

#[derive(Serialize)]
pub struct QuizData {
    pub quiz_id: i32,
    pub chapter_id: i32,
    pub question_count: i32,
    pub difficulty: QuizDifficulty,
    pub status: SheetStatus,
    pub user_id: i32,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Serialize)]
pub struct QuizResponse {
    pub success: bool,
    pub data: QuizData,
    pub message: String,
}

/// A question as shown while taking the quiz. The correct answer is
/// deliberately absent from this type.
#[derive(Serialize, Debug)]
pub struct Question {
    pub question_id: i32,
    pub image_url: Option<String>,
    pub choices_count: i32,
}

#[derive(Serialize, Debug)]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub limit: i64,
    pub total_questions: i64,
}

#[derive(Serialize, Debug)]
pub struct QuizQuestionsData {
    pub quiz_id: i32,
    pub title: String,
    pub difficulty: QuizDifficulty,
    pub questions: Vec<Question>,
    pub pagination: Pagination,
}

#[derive(Deserialize)]
pub struct QuestionPageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    5
}

/// Creates a quiz for `user_id`: validates the request, samples a uniform
/// without-replacement set of problems from the chapter pool, and commits the
/// quiz row, its ordered problem links, the day's study log, and the user's
/// ongoing counter in one transaction.
pub fn create_quiz(
    conn: &mut SqliteConnection,
    rng: &mut impl Rng,
    user_id: i32,
    req: &QuizCreateRequest,
) -> Result<Quiz, ApiError> {
    log::debug!("Starting quiz creation for user {}", user_id);

    let difficulty: QuizDifficulty = req.difficulty.parse().map_err(|_| {
        log::error!("Invalid difficulty level: {}", req.difficulty);
        ApiError::validation(
            "VALIDATION_ERROR",
            "Invalid difficulty level.",
            json!({ "difficulty": "Must be one of easy, medium, hard, random." }),
        )
    })?;

    let chapter = chapters::table
        .filter(chapters::id.eq(req.chapter_id))
        .filter(chapters::deleted_at.is_null())
        .first::<Chapter>(conn)
        .optional()?
        .ok_or_else(|| {
            log::error!("Chapter with id {} does not exist", req.chapter_id);
            ApiError::validation(
                "INVALID_CHAPTER_ID",
                format!("Chapter with ID {} does not exist.", req.chapter_id),
                json!({ "chapter_id": format!("Chapter ID {} is invalid", req.chapter_id) }),
            )
        })?;

    if !ALLOWED_PROBLEM_COUNTS.contains(&req.question_count) {
        log::error!("Invalid question count: {}", req.question_count);
        return Err(ApiError::validation(
            "INVALID_QUESTION_COUNT",
            "Invalid question count.",
            json!({ "question_count": format!("Must be one of {:?}.", ALLOWED_PROBLEM_COUNTS) }),
        ));
    }

    let mut pool_query = problems::table
        .filter(problems::chapter_id.eq(req.chapter_id))
        .filter(problems::deleted_at.is_null())
        .into_boxed();
    if let Some(problem_difficulty) = difficulty.problem_filter() {
        pool_query = pool_query.filter(problems::difficulty.eq(problem_difficulty));
    }
    let pool_ids: Vec<i32> = pool_query.select(problems::id).load(conn)?;

    if (pool_ids.len() as i32) < req.question_count {
        log::error!(
            "Not enough problems in chapter {} for difficulty {}: {} available, {} required",
            req.chapter_id,
            difficulty,
            pool_ids.len(),
            req.question_count
        );
        return Err(ApiError::validation(
            "NOT_ENOUGH_PROBLEMS",
            "Not enough problems in the selected pool.",
            json!({
                "available": pool_ids.len(),
                "required": req.question_count,
            }),
        ));
    }

    let sampled: Vec<i32> = pool_ids
        .choose_multiple(rng, req.question_count as usize)
        .copied()
        .collect();

    let now = Utc::now().naive_utc();
    let title = format!("Chapter {} Quiz", chapter.name);

    let quiz = conn.transaction::<Quiz, ApiError, _>(|conn| {
        diesel::insert_into(quizzes::table)
            .values(&NewQuiz {
                title: &title,
                user_id,
                chapter_id: req.chapter_id,
                difficulty,
                total_problems_count: req.question_count,
                status: SheetStatus::InProgress,
                created_at: now,
            })
            .execute(conn)?;
        let quiz_id = utils::last_insert_rowid(conn)?;

        let links: Vec<NewProblemInQuiz> = sampled
            .iter()
            .enumerate()
            .map(|(idx, problem_id)| NewProblemInQuiz {
                quiz_id,
                problem_id: *problem_id,
                problem_number: idx as i32 + 1,
                created_at: now,
            })
            .collect();
        diesel::insert_into(problems_in_quizzes::table)
            .values(&links)
            .execute(conn)?;

        diesel::insert_into(study_logs::table)
            .values((
                study_logs::user_id.eq(user_id),
                study_logs::quiz_date.eq(now.date()),
                study_logs::quiz_count.eq(1),
                study_logs::created_at.eq(now),
            ))
            .on_conflict((study_logs::user_id, study_logs::quiz_date))
            .do_update()
            .set((
                study_logs::quiz_count.eq(study_logs::quiz_count + 1),
                study_logs::updated_at.eq(now),
            ))
            .execute(conn)?;

        diesel::update(users::table.find(user_id))
            .set(users::ongoing_quizzes_count.eq(users::ongoing_quizzes_count + 1))
            .execute(conn)?;

        quizzes::table
            .find(quiz_id)
            .first::<Quiz>(conn)
            .map_err(ApiError::from)
    })?;

    log::info!("Quiz created with id {}", quiz.id);
    Ok(quiz)
}

/// One page of a quiz's questions in problem-number order.
pub fn get_quiz_questions(
    conn: &mut SqliteConnection,
    quiz_id: i32,
    page: i64,
    limit: i64,
) -> Result<QuizQuestionsData, ApiError> {
    if page < 1 || limit < 1 {
        return Err(ApiError::validation(
            "VALIDATION_ERROR",
            "Page and limit must both be at least 1.",
            json!({ "page": page, "limit": limit }),
        ));
    }

    let quiz = quizzes::table
        .filter(quizzes::id.eq(quiz_id))
        .filter(quizzes::deleted_at.is_null())
        .first::<Quiz>(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(format!("Quiz {} not found", quiz_id)))?;

    let total_questions: i64 = problems_in_quizzes::table
        .filter(problems_in_quizzes::quiz_id.eq(quiz_id))
        .count()
        .get_result(conn)?;

    if total_questions == 0 {
        // A quiz must never exist without linked problems.
        return Err(ApiError::Unexpected(format!(
            "Quiz {} has no linked problems",
            quiz_id
        )));
    }

    let total_pages = (total_questions + limit - 1) / limit;
    if page > total_pages {
        return Err(ApiError::validation(
            "INVALID_PAGE",
            format!("Page {} is out of range; the last page is {}.", page, total_pages),
            json!({ "page": page, "total_pages": total_pages }),
        ));
    }

    let questions: Vec<Question> = problems_in_quizzes::table
        .inner_join(problems::table)
        .filter(problems_in_quizzes::quiz_id.eq(quiz_id))
        .order(problems_in_quizzes::problem_number.asc())
        .offset((page - 1) * limit)
        .limit(limit)
        .select((problems::id, problems::image_url, problems::choices_count))
        .load::<(i32, Option<String>, i32)>(conn)?
        .into_iter()
        .map(|(question_id, image_url, choices_count)| Question {
            question_id,
            image_url,
            choices_count,
        })
        .collect();

    Ok(QuizQuestionsData {
        quiz_id: quiz.id,
        title: quiz.title,
        difficulty: quiz.difficulty,
        questions,
        pagination: Pagination {
            current_page: page,
            total_pages,
            limit,
            total_questions,
        },
    })
}

pub async fn create_quiz_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Json(payload): Json<QuizCreateRequest>,
) -> Result<(StatusCode, Json<QuizResponse>), ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let mut rng = StdRng::from_entropy();
    let quiz = create_quiz(&mut conn, &mut rng, user_id, &payload)?;

    let response = QuizResponse {
        success: true,
        data: QuizData {
            quiz_id: quiz.id,
            chapter_id: quiz.chapter_id,
            question_count: quiz.total_problems_count,
            difficulty: quiz.difficulty,
            status: quiz.status,
            user_id: quiz.user_id,
            created_at: quiz.created_at,
        },
        message: "Quiz created successfully.".to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_questions_endpoint(
    State(pool): State<DbPool>,
    session: Session,
    Path(quiz_id): Path<i32>,
    Query(params): Query<QuestionPageParams>,
) -> Result<Json<QuizQuestionsData>, ApiError> {
    utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let data = get_quiz_questions(&mut conn, quiz_id, params.page, params.limit)?;
    Ok(Json(data))
}

pub fn router(pool: DbPool) -> Router {
    Router::new()
        .route("/", post(create_quiz_endpoint))
        .route("/{quiz_id}/questions", get(get_questions_endpoint))
        .with_state(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{insert_chapter, insert_problem, insert_user, test_conn};

    fn request(chapter_id: i32, question_count: i32, difficulty: &str) -> QuizCreateRequest {
        QuizCreateRequest {
            chapter_id,
            question_count,
            difficulty: difficulty.to_string(),
        }
    }

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn creates_a_quiz_with_contiguous_problem_numbers() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "algebra@example.com");
        let chapter_id = insert_chapter(&mut conn, "Algebra");
        for i in 0..6 {
            insert_problem(&mut conn, chapter_id, "easy", &i.to_string());
        }

        let quiz = create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 5, "easy"),
        )
        .unwrap();

        assert_eq!(quiz.status, SheetStatus::InProgress);
        assert_eq!(quiz.total_problems_count, 5);
        assert_eq!(quiz.title, "Chapter Algebra Quiz");

        let mut links: Vec<(i32, i32)> = problems_in_quizzes::table
            .filter(problems_in_quizzes::quiz_id.eq(quiz.id))
            .select((
                problems_in_quizzes::problem_number,
                problems_in_quizzes::problem_id,
            ))
            .load(&mut conn)
            .unwrap();
        links.sort();

        let numbers: Vec<i32> = links.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

        let mut problem_ids: Vec<i32> = links.iter().map(|(_, p)| *p).collect();
        problem_ids.sort();
        problem_ids.dedup();
        assert_eq!(problem_ids.len(), 5);
    }

    #[test]
    fn rejects_unsupported_question_counts_without_writing() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "count@example.com");
        let chapter_id = insert_chapter(&mut conn, "Geometry");
        for i in 0..40 {
            insert_problem(&mut conn, chapter_id, "easy", &i.to_string());
        }

        let err = create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 7, "easy"),
        )
        .unwrap_err();
        match err {
            ApiError::Validation { code, .. } => assert_eq!(code, "INVALID_QUESTION_COUNT"),
            other => panic!("unexpected error: {:?}", other),
        }

        let quiz_count: i64 = quizzes::table.count().get_result(&mut conn).unwrap();
        assert_eq!(quiz_count, 0);
    }

    #[test]
    fn rejects_unknown_difficulty() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "difficulty@example.com");
        let chapter_id = insert_chapter(&mut conn, "Calculus");

        let err = create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 5, "extreme"),
        )
        .unwrap_err();
        match err {
            ApiError::Validation { code, .. } => assert_eq!(code, "VALIDATION_ERROR"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn rejects_missing_chapter() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "chapter@example.com");

        let err = create_quiz(&mut conn, &mut seeded_rng(), user_id, &request(999, 5, "easy"))
            .unwrap_err();
        match err {
            ApiError::Validation { code, .. } => assert_eq!(code, "INVALID_CHAPTER_ID"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn reports_pool_shortfall_and_leaves_no_partial_quiz() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "shortfall@example.com");
        let chapter_id = insert_chapter(&mut conn, "Algebra");
        for i in 0..6 {
            insert_problem(&mut conn, chapter_id, "easy", &i.to_string());
        }

        let err = create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 10, "easy"),
        )
        .unwrap_err();
        match err {
            ApiError::Validation { code, details, .. } => {
                assert_eq!(code, "NOT_ENOUGH_PROBLEMS");
                assert_eq!(details["available"], 6);
                assert_eq!(details["required"], 10);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let quiz_count: i64 = quizzes::table.count().get_result(&mut conn).unwrap();
        let link_count: i64 = problems_in_quizzes::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!((quiz_count, link_count), (0, 0));
    }

    #[test]
    fn random_difficulty_samples_across_the_whole_chapter() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "random@example.com");
        let chapter_id = insert_chapter(&mut conn, "Mixed");
        insert_problem(&mut conn, chapter_id, "easy", "1");
        insert_problem(&mut conn, chapter_id, "medium", "2");
        insert_problem(&mut conn, chapter_id, "hard", "3");
        insert_problem(&mut conn, chapter_id, "easy", "4");
        insert_problem(&mut conn, chapter_id, "hard", "5");

        // Only 2 easy problems exist, so this pool must be the full chapter.
        let quiz = create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 5, "random"),
        )
        .unwrap();
        assert_eq!(quiz.difficulty, QuizDifficulty::Random);
    }

    #[test]
    fn quiz_creation_records_study_log_and_ongoing_counter() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "log@example.com");
        let chapter_id = insert_chapter(&mut conn, "Algebra");
        for i in 0..10 {
            insert_problem(&mut conn, chapter_id, "easy", &i.to_string());
        }

        create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 5, "easy"),
        )
        .unwrap();
        create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 5, "easy"),
        )
        .unwrap();

        let (log_rows, todays_count): (i64, i32) = (
            study_logs::table.count().get_result(&mut conn).unwrap(),
            study_logs::table
                .filter(study_logs::user_id.eq(user_id))
                .select(study_logs::quiz_count)
                .first(&mut conn)
                .unwrap(),
        );
        assert_eq!(log_rows, 1);
        assert_eq!(todays_count, 2);

        let ongoing: i32 = users::table
            .find(user_id)
            .select(users::ongoing_quizzes_count)
            .first(&mut conn)
            .unwrap();
        assert_eq!(ongoing, 2);
    }

    #[test]
    fn question_pager_orders_by_problem_number_and_bounds_pages() {
        let mut conn = test_conn();
        let user_id = insert_user(&mut conn, "pager@example.com");
        let chapter_id = insert_chapter(&mut conn, "Algebra");
        for i in 0..10 {
            insert_problem(&mut conn, chapter_id, "easy", &i.to_string());
        }
        let quiz = create_quiz(
            &mut conn,
            &mut seeded_rng(),
            user_id,
            &request(chapter_id, 10, "easy"),
        )
        .unwrap();

        let page1 = get_quiz_questions(&mut conn, quiz.id, 1, 4).unwrap();
        assert_eq!(page1.questions.len(), 4);
        assert_eq!(page1.pagination.total_pages, 3);
        assert_eq!(page1.pagination.total_questions, 10);

        let expected: Vec<i32> = problems_in_quizzes::table
            .filter(problems_in_quizzes::quiz_id.eq(quiz.id))
            .order(problems_in_quizzes::problem_number.asc())
            .select(problems_in_quizzes::problem_id)
            .limit(4)
            .load(&mut conn)
            .unwrap();
        let got: Vec<i32> = page1.questions.iter().map(|q| q.question_id).collect();
        assert_eq!(got, expected);

        let last = get_quiz_questions(&mut conn, quiz.id, 3, 4).unwrap();
        assert_eq!(last.questions.len(), 2);

        let err = get_quiz_questions(&mut conn, quiz.id, 4, 4).unwrap_err();
        match err {
            ApiError::Validation { code, details, .. } => {
                assert_eq!(code, "INVALID_PAGE");
                assert_eq!(details["total_pages"], 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn question_pager_404s_on_missing_quiz() {
        let mut conn = test_conn();
        let err = get_quiz_questions(&mut conn, 123, 1, 5).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
