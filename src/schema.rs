diesel::table! {
    chapters (id) {
        id -> Integer,
        name -> Text,
        description -> Nullable<Text>,
        chapter_order -> Nullable<Integer>,
        problems_count -> Integer,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
        deleted_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    problems (id) {
        id -> Integer,
        chapter_id -> Integer,
        difficulty -> Text,
        problem_text -> Text,
        image_url -> Nullable<Text>,
        correct_answer -> Text,
        explanation -> Nullable<Text>,
        choices_count -> Integer,
        attempt_count -> Integer,
        correct_count -> Integer,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
        deleted_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    quizzes (id) {
        id -> Integer,
        title -> Text,
        user_id -> Integer,
        chapter_id -> Integer,
        difficulty -> Text,
        total_problems_count -> Integer,
        status -> Text,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
        deleted_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    problems_in_quizzes (id) {
        id -> Integer,
        quiz_id -> Integer,
        problem_id -> Integer,
        problem_number -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    answer_sheets (id) {
        id -> Integer,
        quiz_id -> Integer,
        user_id -> Integer,
        status -> Text,
        passed_time -> Nullable<Integer>,
        unanswered_count -> Integer,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
        deleted_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    user_answers (id) {
        id -> Integer,
        answer_sheet_id -> Integer,
        problem_id -> Integer,
        user_answer -> Nullable<Text>,
        is_correct -> Bool,
        is_starred -> Bool,
        has_answer -> Bool,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    grading_results (id) {
        id -> Integer,
        answer_sheet_id -> Integer,
        problem_id -> Integer,
        result -> Text,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    user_problem_stats (id) {
        id -> Integer,
        user_id -> Integer,
        problem_id -> Integer,
        is_starred -> Bool,
        correct_attempts_count -> Integer,
        total_attempts_count -> Integer,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    study_logs (id) {
        id -> Integer,
        user_id -> Integer,
        quiz_date -> Date,
        quiz_count -> Integer,
        created_at -> Timestamp,
        updated_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        name -> Text,
        email -> Text,
        password -> Text,
        review_completed_quizzes_count -> Integer,
        graded_quizzes_count -> Integer,
        ongoing_quizzes_count -> Integer,
        last_login_at -> Nullable<Timestamp>,
        is_active -> Bool,
        created_at -> Timestamp,
    }
}

diesel::joinable!(problems -> chapters (chapter_id));
diesel::joinable!(quizzes -> chapters (chapter_id));
diesel::joinable!(quizzes -> users (user_id));
diesel::joinable!(problems_in_quizzes -> quizzes (quiz_id));
diesel::joinable!(problems_in_quizzes -> problems (problem_id));
diesel::joinable!(answer_sheets -> quizzes (quiz_id));
diesel::joinable!(answer_sheets -> users (user_id));
diesel::joinable!(user_answers -> answer_sheets (answer_sheet_id));
diesel::joinable!(user_answers -> problems (problem_id));
diesel::joinable!(grading_results -> answer_sheets (answer_sheet_id));
diesel::joinable!(grading_results -> problems (problem_id));
diesel::joinable!(user_problem_stats -> users (user_id));
diesel::joinable!(user_problem_stats -> problems (problem_id));
diesel::joinable!(study_logs -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    chapters,
    problems,
    quizzes,
    problems_in_quizzes,
    answer_sheets,
    user_answers,
    grading_results,
    user_problem_stats,
    study_logs,
    users,
);
