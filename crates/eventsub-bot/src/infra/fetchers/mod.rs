mod twitch_adapter;

pub use twitch_adapter::TwitchFetcher;
