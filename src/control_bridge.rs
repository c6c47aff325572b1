use crate::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub enum ControlEvent {
    /// 消息内容和发送方地址，回复直接发回发送方
    Message(String, SocketAddr),
}

pub struct ControlBridge {
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    tx: mpsc::Sender<ControlEvent>,
}

// 电话/拨号进程通过本地UDP下发控制消息，地址在配置中指定
impl ControlBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<ControlEvent>) -> anyhow::Result<Self> {
        let addr = format!("{}:{}", config.control_local_ip, config.control_local_port);
        Self::bind(&addr, config.control_buffer_size, tx).await
    }

    pub async fn bind(
        addr: &str,
        buffer_size: usize,
        tx: mpsc::Sender<ControlEvent>,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        log::info!("Control bridge listening on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            buffer_size,
            tx,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            match std::str::from_utf8(&buf[..len]) {
                Ok(msg) => {
                    if let Err(e) = self.tx.send(ControlEvent::Message(msg.to_string(), peer)).await {
                        log::error!("Failed to forward control event: {}", e);
                        break;
                    }
                }
                Err(_) => log::warn!("Dropping non UTF-8 datagram from {}", peer),
            }
        }
        Ok(())
    }

    pub async fn send_to(&self, msg: &str, peer: SocketAddr) -> anyhow::Result<()> {
        self.socket.send_to(msg.as_bytes(), peer).await?;
        Ok(())
    }
}
