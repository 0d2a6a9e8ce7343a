use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::quiz::{self, QuizCreateRequest};
use crate::schema::{chapters, problems, problems_in_quizzes, users};
use crate::utils;

const DDL: &str = r#"
CREATE TABLE chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    chapter_order INTEGER,
    problems_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    deleted_at TIMESTAMP
);

CREATE TABLE problems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chapter_id INTEGER NOT NULL REFERENCES chapters (id),
    difficulty TEXT NOT NULL,
    problem_text TEXT NOT NULL,
    image_url TEXT,
    correct_answer TEXT NOT NULL,
    explanation TEXT,
    choices_count INTEGER NOT NULL DEFAULT 5,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    correct_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    deleted_at TIMESTAMP
);

CREATE TABLE quizzes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users (id),
    chapter_id INTEGER NOT NULL REFERENCES chapters (id),
    difficulty TEXT NOT NULL,
    total_problems_count INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    deleted_at TIMESTAMP
);

CREATE TABLE problems_in_quizzes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quiz_id INTEGER NOT NULL REFERENCES quizzes (id),
    problem_id INTEGER NOT NULL REFERENCES problems (id),
    problem_number INTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (quiz_id, problem_number),
    UNIQUE (quiz_id, problem_id)
);

CREATE TABLE answer_sheets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quiz_id INTEGER NOT NULL REFERENCES quizzes (id),
    user_id INTEGER NOT NULL REFERENCES users (id),
    status TEXT NOT NULL,
    passed_time INTEGER,
    unanswered_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    deleted_at TIMESTAMP,
    UNIQUE (quiz_id, user_id)
);

CREATE TABLE user_answers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    answer_sheet_id INTEGER NOT NULL REFERENCES answer_sheets (id),
    problem_id INTEGER NOT NULL REFERENCES problems (id),
    user_answer TEXT,
    is_correct BOOLEAN NOT NULL DEFAULT 0,
    is_starred BOOLEAN NOT NULL DEFAULT 0,
    has_answer BOOLEAN NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    UNIQUE (answer_sheet_id, problem_id)
);

CREATE TABLE grading_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    answer_sheet_id INTEGER NOT NULL REFERENCES answer_sheets (id),
    problem_id INTEGER NOT NULL REFERENCES problems (id),
    result TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    UNIQUE (answer_sheet_id, problem_id)
);

CREATE TABLE user_problem_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (id),
    problem_id INTEGER NOT NULL REFERENCES problems (id),
    is_starred BOOLEAN NOT NULL DEFAULT 0,
    correct_attempts_count INTEGER NOT NULL DEFAULT 0,
    total_attempts_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    UNIQUE (user_id, problem_id)
);

CREATE TABLE study_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (id),
    quiz_date DATE NOT NULL,
    quiz_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP,
    UNIQUE (user_id, quiz_date)
);

CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    review_completed_quizzes_count INTEGER NOT NULL DEFAULT 0,
    graded_quizzes_count INTEGER NOT NULL DEFAULT 0,
    ongoing_quizzes_count INTEGER NOT NULL DEFAULT 0,
    last_login_at TIMESTAMP,
    is_active BOOLEAN NOT NULL DEFAULT 1,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

pub fn test_conn() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:").expect("in-memory sqlite");
    conn.batch_execute(DDL).expect("schema setup");
    conn
}

pub fn insert_user(conn: &mut SqliteConnection, email: &str) -> i32 {
    diesel::insert_into(users::table)
        .values((
            users::name.eq("Test User"),
            users::email.eq(email),
            users::password.eq("not-a-real-hash"),
            users::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .expect("insert user");
    utils::last_insert_rowid(conn).expect("user id")
}

pub fn insert_chapter(conn: &mut SqliteConnection, name: &str) -> i32 {
    diesel::insert_into(chapters::table)
        .values((
            chapters::name.eq(name),
            chapters::problems_count.eq(0),
            chapters::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .expect("insert chapter");
    utils::last_insert_rowid(conn).expect("chapter id")
}

pub fn insert_problem(
    conn: &mut SqliteConnection,
    chapter_id: i32,
    difficulty: &str,
    correct_answer: &str,
) -> i32 {
    diesel::insert_into(problems::table)
        .values((
            problems::chapter_id.eq(chapter_id),
            problems::difficulty.eq(difficulty),
            problems::problem_text.eq("What is the answer?"),
            problems::correct_answer.eq(correct_answer),
            problems::choices_count.eq(5),
            problems::created_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .expect("insert problem");
    utils::last_insert_rowid(conn).expect("problem id")
}

/// A ready-to-take quiz in chapter "Fixture": `question_count` easy problems,
/// all with correct answer "2". Returns the quiz id and its problem ids in
/// problem-number order.
pub fn fixture_quiz(
    conn: &mut SqliteConnection,
    user_id: i32,
    question_count: i32,
) -> (i32, Vec<i32>) {
    let chapter_id = insert_chapter(conn, "Fixture");
    for _ in 0..question_count {
        insert_problem(conn, chapter_id, "easy", "2");
    }

    let mut rng = StdRng::seed_from_u64(7);
    let quiz = quiz::create_quiz(
        conn,
        &mut rng,
        user_id,
        &QuizCreateRequest {
            chapter_id,
            question_count,
            difficulty: "easy".to_string(),
        },
    )
    .expect("fixture quiz");

    let problem_ids = problems_in_quizzes::table
        .filter(problems_in_quizzes::quiz_id.eq(quiz.id))
        .order(problems_in_quizzes::problem_number.asc())
        .select(problems_in_quizzes::problem_id)
        .load(conn)
        .expect("fixture links");

    (quiz.id, problem_ids)
}
