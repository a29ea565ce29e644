diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        password_hash -> Text,
        role -> Varchar,
        department -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        ticket_number -> Varchar,
        title -> Varchar,
        description -> Text,
        status -> Varchar,
        priority -> Varchar,
        category -> Varchar,
        created_by -> Uuid,
        assigned_to -> Nullable<Uuid>,
        tags -> Array<Text>,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author_id -> Uuid,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_history (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        description -> Text,
        user_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_attachments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        name -> Text,
        url -> Text,
        size_bytes -> Int8,
        mime_type -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_history -> tickets (ticket_id));
diesel::joinable!(ticket_attachments -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    tickets,
    ticket_comments,
    ticket_history,
    ticket_attachments,
);
