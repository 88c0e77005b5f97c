pub mod channel_reporter;

pub use channel_reporter::ChannelEvidenceReporter;
