diesel::table! {
    class_bookings (id) {
        id -> Int4,
        schedule_id -> Int4,
        user_id -> Int4,
        booking_status -> Varchar,
        booked_at -> Timestamptz,
        cancelled_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    class_schedules (id) {
        id -> Int4,
        class_id -> Int4,
        scheduled_date -> Date,
        start_time -> Time,
        end_time -> Time,
        current_capacity -> Int4,
        status -> Varchar,
    }
}

diesel::table! {
    fitness_classes (id) {
        id -> Int4,
        name -> Varchar,
        trainer_id -> Nullable<Int4>,
        max_capacity -> Int4,
        is_active -> Bool,
    }
}

diesel::joinable!(class_bookings -> class_schedules (schedule_id));
diesel::joinable!(class_schedules -> fitness_classes (class_id));

diesel::allow_tables_to_appear_in_same_query!(
    class_bookings,
    class_schedules,
    fitness_classes,
);
