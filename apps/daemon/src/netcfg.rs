//! CAN 网络接口准备与清理
//!
//! 接口的创建/启动/删除由系统工具（`modprobe`/`ip link`）完成，
//! 这里只是对外部命令的薄封装。只有本进程创建的接口才会在退出
//! 时删除，已存在的接口保持原样。
//!
//! 需要 root 权限或相应的 CAP_NET_ADMIN 能力。

use std::io;
use std::process::Command;
use tracing::{debug, info, warn};

/// CAN 接口守卫
///
/// [`ensure`](InterfaceGuard::ensure) 保证接口存在且处于 UP 状态；
/// Drop 时删除由本进程创建的接口。
#[derive(Debug)]
pub struct InterfaceGuard {
    name: String,
    created: bool,
}

impl InterfaceGuard {
    /// 确保 CAN 接口可用
    ///
    /// 接口不存在时加载 vcan 模块并创建虚拟接口；已存在时只确保
    /// UP 状态。`no_setup` 为真时跳过一切系统配置，接口必须已就绪。
    ///
    /// # 错误
    /// - 外部命令执行失败（权限不足、模块缺失）
    /// - `no_setup` 且接口不存在
    pub fn ensure(name: &str, no_setup: bool) -> io::Result<Self> {
        if interface_exists(name) {
            debug!("CAN interface '{}' already exists", name);
            if !no_setup {
                run_checked("ip", &["link", "set", "up", name])?;
            }
            return Ok(Self {
                name: name.to_string(),
                created: false,
            });
        }

        if no_setup {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "CAN interface '{}' does not exist (--no-setup given). \
                     Create it with: ip link add dev {} type vcan && ip link set up {}",
                    name, name, name
                ),
            ));
        }

        run_checked("modprobe", &["vcan"])?;
        run_checked("ip", &["link", "add", "dev", name, "type", "vcan"])?;
        run_checked("ip", &["link", "set", "up", name])?;
        info!("Created CAN interface '{}'", name);

        Ok(Self {
            name: name.to_string(),
            created: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for InterfaceGuard {
    fn drop(&mut self) {
        if !self.created {
            return;
        }
        match run_checked("ip", &["link", "delete", "dev", &self.name]) {
            Ok(()) => debug!("Deleted CAN interface '{}'", self.name),
            Err(e) => warn!("Failed to delete CAN interface '{}': {}", self.name, e),
        }
    }
}

/// 检查 CAN 接口是否存在
fn interface_exists(name: &str) -> bool {
    let output = Command::new("ip").args(["link", "show", name]).output();

    output.is_ok() && output.unwrap().status.success()
}

/// 执行外部命令并要求零退出码
fn run_checked(program: &str, args: &[&str]) -> io::Result<()> {
    let status = Command::new(program).args(args).status()?;
    if !status.success() {
        return Err(io::Error::other(format!(
            "`{} {}` exited with {}",
            program,
            args.join(" "),
            status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_exists_for_missing_interface() {
        assert!(!interface_exists("definitely_missing_can99"));
    }

    #[test]
    fn test_run_checked_reports_nonzero_exit() {
        // `false` 总是以非零退出
        assert!(run_checked("false", &[]).is_err());
        assert!(run_checked("true", &[]).is_ok());
    }

    #[test]
    fn test_ensure_missing_interface_with_no_setup_fails() {
        let result = InterfaceGuard::ensure("definitely_missing_can99", true);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
