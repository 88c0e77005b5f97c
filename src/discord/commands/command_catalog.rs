// Discord commands module.
// Each feature gets its own command file.

pub mod group_config;

/// Every command the agent registers.
pub fn all() -> Vec<poise::Command<group_config::Data, group_config::Error>> {
    vec![group_config::config(), group_config::config_lang()]
}
