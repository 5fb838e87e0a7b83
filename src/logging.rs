//! ログ出力の初期化

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// tracing のサブスクライバを初期化（2 回目以降の呼び出しは何もしない）
///
/// レベルは環境変数 `RUST_LOG` で指定でき、未指定なら `info` です。
pub fn init_logging() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}
