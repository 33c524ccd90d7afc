use atrac::logging::{LoggingConfig, build_current_log_path, cleanup_expired_logs, init};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// 注意: 由于 tracing 的全局订阅器只能初始化一次,
// 涉及 init() 的测试都集中在 test_logging_init_writes_file 中

fn temp_dir() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(err) => panic!("创建临时目录失败: {}", err),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("非法日期 {}-{}-{}", y, m, d))
}

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"x").expect("创建测试文件失败");
}

#[test]
fn test_logging_init_writes_file() {
    let dir = temp_dir();
    let log_dir = dir.path().join("nested").join("logs");
    assert!(!log_dir.exists(), "测试前日志目录不应该存在");

    let config = LoggingConfig {
        level: "info".to_string(),
        directory: log_dir.to_string_lossy().to_string(),
        file_prefix: "atrac-test".to_string(),
        retention_days: 7,
    };
    init(config.clone()).expect("日志初始化失败");
    assert!(log_dir.exists(), "嵌套日志目录应该被创建");

    // 编码核心经 log 门面输出, 应被桥接进文件
    log::info!("编码器日志_LOG_MSG");
    tracing::info!("信息日志_INFO_MSG");
    tracing::debug!("调试日志_DEBUG_MSG");
    std::thread::sleep(std::time::Duration::from_millis(200));

    let today = chrono::Local::now().date_naive();
    let log_file = build_current_log_path(&log_dir, "atrac-test", today);
    let content = fs::read_to_string(&log_file)
        .unwrap_or_else(|e| panic!("读取日志文件失败: {:?}, 错误: {}", log_file, e));
    assert!(content.contains("信息日志_INFO_MSG"), "应该包含信息日志");
    assert!(content.contains("编码器日志_LOG_MSG"), "应该包含 log 门面输出");
    assert!(content.contains("INFO"), "日志应该包含 INFO 级别标记");
    assert!(!content.contains("调试日志_DEBUG_MSG"), "debug 日志应该被过滤掉");

    // 第二次安装订阅器必须失败
    assert!(init(config).is_err());
}

#[test]
fn test_cleanup_expired_logs() {
    let dir = temp_dir();
    let today = date(2026, 3, 10);
    touch(dir.path(), "atrac.2026-03-10.log");
    touch(dir.path(), "atrac.2026-03-03.log");
    touch(dir.path(), "atrac.2026-02-01.log");
    touch(dir.path(), "other.2026-02-01.log");
    touch(dir.path(), "notes.txt");

    let removed = cleanup_expired_logs(dir.path(), "atrac", today, 7).expect("清理失败");
    assert_eq!(removed, 1);
    assert!(dir.path().join("atrac.2026-03-10.log").exists());
    assert!(dir.path().join("atrac.2026-03-03.log").exists(), "保留期边界上的日志应保留");
    assert!(!dir.path().join("atrac.2026-02-01.log").exists());
    assert!(dir.path().join("other.2026-02-01.log").exists(), "其他前缀不应被删除");
    assert!(dir.path().join("notes.txt").exists());
}

#[test]
fn test_cleanup_missing_directory() {
    let dir = temp_dir();
    let missing = dir.path().join("missing");
    assert_eq!(cleanup_expired_logs(&missing, "atrac", date(2026, 1, 1), 30).unwrap(), 0);
}

#[test]
fn test_logging_config_defaults() {
    let config: LoggingConfig =
        serde_json::from_str(r#"{"level":"debug","directory":"logs","file_prefix":"atrac"}"#)
            .expect("解析日志配置失败");
    assert_eq!(config.retention_days, 30, "默认保留天数应该是 30");
    assert_eq!(config.file_prefix, "atrac");

    let json = serde_json::to_string(&config).expect("序列化日志配置失败");
    assert!(json.contains("\"retention_days\":30"));
}
