/// Build a [`FeedDict`](crate::session::FeedDict) from `placeholder => value`
/// pairs, where `value` is an `Option<Tensor>`.
#[macro_export]
macro_rules! feed_dict {
    () => {
        $crate::session::FeedDict::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut feeds: $crate::session::FeedDict = ::std::collections::HashMap::new();
        $(
            feeds.insert($name, $value);
        )+
        feeds
    }};
}
