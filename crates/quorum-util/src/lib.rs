pub mod room_code;
pub mod snowflake;
pub mod validation;
