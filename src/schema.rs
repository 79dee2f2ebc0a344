diesel::table! {
    users (id) {
        id -> Uuid,
        #[max_length = 255]
        email -> Varchar,
        #[max_length = 255]
        password_hash -> Varchar,
        #[max_length = 100]
        first_name -> Varchar,
        #[max_length = 100]
        last_name -> Varchar,
        #[max_length = 32]
        user_type -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    properties (id) {
        id -> Uuid,
        owner_id -> Uuid,
        #[max_length = 255]
        name -> Varchar,
        address -> Text,
        #[max_length = 50]
        property_type -> Nullable<Varchar>,
        bedrooms -> Nullable<Int4>,
        bathrooms -> Nullable<Float8>,
        square_footage -> Nullable<Int4>,
        lot_size -> Nullable<Float8>,
        year_built -> Nullable<Int4>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    property_permissions (id) {
        id -> Uuid,
        property_id -> Uuid,
        user_id -> Uuid,
        #[max_length = 32]
        role -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    projects (id) {
        id -> Uuid,
        property_id -> Uuid,
        created_by -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        description -> Nullable<Text>,
        #[max_length = 32]
        status -> Varchar,
        #[max_length = 32]
        priority -> Varchar,
        budget -> Nullable<Float8>,
        actual_cost -> Nullable<Float8>,
        start_date -> Nullable<Date>,
        end_date -> Nullable<Date>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    project_assignments (id) {
        id -> Uuid,
        project_id -> Uuid,
        user_id -> Uuid,
        #[max_length = 32]
        role -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    project_tasks (id) {
        id -> Uuid,
        project_id -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        description -> Nullable<Text>,
        #[max_length = 32]
        status -> Varchar,
        progress_percentage -> Int4,
        assigned_to -> Nullable<Uuid>,
        due_date -> Nullable<Date>,
        estimated_hours -> Nullable<Float8>,
        actual_hours -> Nullable<Float8>,
        cost -> Nullable<Float8>,
        sort_order -> Int4,
        status_changed_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    task_dependencies (id) {
        id -> Uuid,
        task_id -> Uuid,
        depends_on_task_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    task_time_sessions (id) {
        id -> Uuid,
        task_id -> Uuid,
        user_id -> Uuid,
        started_at -> Timestamptz,
        ended_at -> Nullable<Timestamptz>,
        duration_minutes -> Nullable<Int4>,
        is_active -> Bool,
    }
}

diesel::table! {
    task_comments (id) {
        id -> Uuid,
        task_id -> Uuid,
        user_id -> Uuid,
        content -> Text,
        #[max_length = 32]
        comment_type -> Varchar,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    maintenance_schedules (id) {
        id -> Uuid,
        property_id -> Uuid,
        created_by -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        description -> Nullable<Text>,
        #[max_length = 32]
        frequency -> Varchar,
        frequency_multiplier -> Int4,
        next_due_date -> Nullable<Date>,
        last_completed_date -> Nullable<Date>,
        is_active -> Bool,
        assigned_to -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    maintenance_records (id) {
        id -> Uuid,
        schedule_id -> Uuid,
        completed_by -> Uuid,
        completed_date -> Date,
        notes -> Nullable<Text>,
        actual_duration_minutes -> Nullable<Int4>,
        #[max_length = 32]
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        property_id -> Nullable<Uuid>,
        project_id -> Nullable<Uuid>,
        uploaded_by -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        #[max_length = 50]
        document_type -> Nullable<Varchar>,
        #[max_length = 50]
        category -> Nullable<Varchar>,
        #[max_length = 255]
        vendor -> Nullable<Varchar>,
        amount -> Nullable<Float8>,
        document_date -> Nullable<Date>,
        file_path -> Nullable<Text>,
        file_size -> Nullable<Int8>,
        #[max_length = 100]
        mime_type -> Nullable<Varchar>,
        #[max_length = 64]
        content_hash -> Nullable<Varchar>,
        tags -> Jsonb,
        #[max_length = 16]
        status -> Varchar,
        view_count -> Int4,
        is_favorite -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    insurance_items (id) {
        id -> Uuid,
        property_id -> Uuid,
        created_by -> Uuid,
        #[max_length = 255]
        name -> Varchar,
        description -> Nullable<Text>,
        #[max_length = 50]
        category -> Varchar,
        #[max_length = 100]
        brand -> Nullable<Varchar>,
        #[max_length = 100]
        model -> Nullable<Varchar>,
        #[max_length = 100]
        serial_number -> Nullable<Varchar>,
        purchase_date -> Nullable<Date>,
        purchase_price -> Nullable<Float8>,
        current_value -> Nullable<Float8>,
        #[max_length = 32]
        condition -> Nullable<Varchar>,
        #[max_length = 255]
        location -> Nullable<Varchar>,
        #[max_length = 100]
        policy_number -> Nullable<Varchar>,
        coverage_amount -> Nullable<Float8>,
        tags -> Jsonb,
        #[max_length = 16]
        status -> Varchar,
        is_favorite -> Bool,
        #[max_length = 16]
        priority -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    insurance_item_photos (id) {
        id -> Uuid,
        item_id -> Uuid,
        file_path -> Text,
        file_size -> Int8,
        #[max_length = 100]
        mime_type -> Nullable<Varchar>,
        caption -> Nullable<Text>,
        is_primary -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    insurance_item_documents (id) {
        id -> Uuid,
        item_id -> Uuid,
        document_id -> Uuid,
        #[max_length = 32]
        relationship_type -> Varchar,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(properties -> users (owner_id));
diesel::joinable!(property_permissions -> properties (property_id));
diesel::joinable!(property_permissions -> users (user_id));
diesel::joinable!(projects -> properties (property_id));
diesel::joinable!(project_assignments -> projects (project_id));
diesel::joinable!(project_assignments -> users (user_id));
diesel::joinable!(project_tasks -> projects (project_id));
diesel::joinable!(task_comments -> project_tasks (task_id));
diesel::joinable!(task_comments -> users (user_id));
diesel::joinable!(task_time_sessions -> project_tasks (task_id));
diesel::joinable!(task_time_sessions -> users (user_id));
diesel::joinable!(maintenance_schedules -> properties (property_id));
diesel::joinable!(maintenance_records -> maintenance_schedules (schedule_id));
diesel::joinable!(insurance_items -> properties (property_id));
diesel::joinable!(insurance_item_photos -> insurance_items (item_id));
diesel::joinable!(insurance_item_documents -> insurance_items (item_id));
diesel::joinable!(insurance_item_documents -> documents (document_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    properties,
    property_permissions,
    projects,
    project_assignments,
    project_tasks,
    task_dependencies,
    task_time_sessions,
    task_comments,
    maintenance_schedules,
    maintenance_records,
    documents,
    insurance_items,
    insurance_item_photos,
    insurance_item_documents,
);
