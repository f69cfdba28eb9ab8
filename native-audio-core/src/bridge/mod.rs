pub mod callback_bridge;
