// handlers/mod.rs - two tiers
//
// Public (no auth): service info, health, login
// Protected (JWT auth): the register under /api/*
pub mod protected;
pub mod public;
