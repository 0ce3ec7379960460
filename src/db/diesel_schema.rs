diesel::table! {
    members (id) {
        id -> Text,
        username -> Nullable<Text>,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        sponsor_id -> Nullable<Text>,
        parent_id -> Nullable<Text>,
        path -> Nullable<Text>,
        depth -> Nullable<Integer>,
        position_index -> Nullable<Integer>,
        qualification_level -> Integer,
        activity_status -> Text,
        is_active -> Integer,
        active_until -> Nullable<Text>,
        last_renewal_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    available_slots (id) {
        id -> Integer,
        member_id -> Text,
        depth -> Integer,
        path -> Text,
        child_count -> Integer,
    }
}

diesel::table! {
    commission_settings (level) {
        level -> Integer,
        percent -> Text,
    }
}

diesel::table! {
    commission_ledger (id) {
        id -> Text,
        member_id -> Text,
        source_member_id -> Text,
        level -> Integer,
        amount -> Text,
        currency -> Text,
        status -> Text,
        reason -> Nullable<Text>,
        event_ref -> Text,
        wallet_transaction_id -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    activity_history (id) {
        id -> Text,
        member_id -> Text,
        period -> Text,
        status -> Text,
        notes -> Nullable<Text>,
        checked_at -> Text,
    }
}

diesel::table! {
    qualification_history (id) {
        id -> Text,
        member_id -> Text,
        level -> Integer,
        status -> Text,
        notes -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    wallets (member_id) {
        member_id -> Text,
        main_balance -> Text,
        referral_balance -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    wallet_transactions (id) {
        id -> Text,
        member_id -> Text,
        tx_type -> Text,
        status -> Text,
        provider -> Text,
        amount -> Text,
        currency -> Text,
        wallet_to -> Nullable<Text>,
        reference_id -> Nullable<Text>,
        description -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::joinable!(available_slots -> members (member_id));
diesel::joinable!(activity_history -> members (member_id));
diesel::joinable!(qualification_history -> members (member_id));
diesel::joinable!(wallet_transactions -> members (member_id));

diesel::allow_tables_to_appear_in_same_query!(
    members,
    available_slots,
    commission_settings,
    commission_ledger,
    activity_history,
    qualification_history,
    wallets,
    wallet_transactions,
);
