//! MSAR ERP 업데이터 애플리케이션
//!
//! 설치 파이프라인은 `updater` 크레이트에 있고, 여기서는 설정 파일과 CLI만 다룹니다.

pub mod cli;
pub mod config;

pub use updater_erp_lib as updater;
