mod audio;
mod config;
mod control_bridge;
mod controller;
mod protocol;

use audio::{AudioSystem, PactlServer};
use config::Config;
use control_bridge::{ControlBridge, ControlEvent};
use controller::CoreController;
use std::rc::Rc;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置，环境变量可覆盖调制解调器声卡名
    let mut config = Config::new().unwrap_or_default();
    config.apply_env();
    log::info!("{} {} starting", config.app_name, config.app_version);

    // 音频服务器的所有回调都在本线程的 LocalSet 上运行
    LocalSet::new().run_until(run(config)).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    // 连接音频服务器，等待就绪
    let server = Rc::new(PactlServer::new(
        config.pactl,
        config.pulse_server,
        config.app_name,
    ));
    let audio = AudioSystem::start(
        server,
        config.modem_card_name.clone(),
        config.loopback_tuning(),
    )
    .await?;
    let connection = audio.connection().clone();

    // 控制通道
    let (tx_control_event, mut rx_control_event) = mpsc::channel::<ControlEvent>(100);
    let control_bridge = Arc::new(ControlBridge::new(&config, tx_control_event).await?);
    let control_bridge_clone = control_bridge.clone();
    tokio::spawn(async move {
        if let Err(e) = control_bridge_clone.run().await {
            log::error!("ControlBridge error: {}", e);
        }
    });

    let mut controller = CoreController::new(audio, control_bridge);
    log::info!("Call audio router started");

    let fatal = connection.fatal();
    tokio::pin!(fatal);

    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            // 音频服务器通道出现不可恢复的错误
            err = &mut fatal => {
                return Err(err.context("Audio server connection failed"));
            }

            Some(event) = rx_control_event.recv() => {
                controller.handle_control_event(event).await;
            }
        }
    }

    Ok(())
}
