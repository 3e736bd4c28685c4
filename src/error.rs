//! 统一的错误类型
//!
//! 网络类错误在探测单元内部就地吸收，数据源类错误只影响单个数据源，
//! 配置类错误只影响对应的发现方法，只有 `FatalInput` 会在发现开始前终止运行。

use thiserror::Error;

/// 扫描过程中可能出现的错误
#[derive(Debug, Error)]
pub enum ReconError {
    /// 超时、连接被拒绝、解析失败等网络问题
    #[error("网络错误: {0}")]
    Network(String),

    /// 权威应答确认名称不存在
    #[error("域名不存在: {0}")]
    NameNotFound(String),

    /// 外部数据源返回非成功状态或不可达
    #[error("数据源 {source_name} 不可用: {reason}")]
    SourceUnavailable {
        /// 数据源名称
        source_name: String,
        /// 失败原因
        reason: String,
    },

    /// 响应体格式错误
    #[error("数据源 {source_name} 返回了无法解析的数据: {reason}")]
    Data {
        /// 数据源名称
        source_name: String,
        /// 解析失败原因
        reason: String,
    },

    /// 缺少字典、输出路径等配置
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 无法得到有效的目标域名
    #[error("无效的目标域名: {0}")]
    FatalInput(String),

    /// 文件读写错误
    #[error("I/O错误: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconError {
    /// 构造数据源不可用错误
    pub fn unavailable(source_name: &str, reason: impl ToString) -> Self {
        ReconError::SourceUnavailable {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// 构造数据格式错误
    pub fn data(source_name: &str, reason: impl ToString) -> Self {
        ReconError::Data {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// 本库统一使用的结果类型
pub type Result<T> = std::result::Result<T, ReconError>;
