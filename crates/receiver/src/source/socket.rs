//! UDP 소켓 수집 소스
//!
//! 설정된 주소에 바인드하고 (선택적으로) 멀티캐스트 그룹에 가입한 뒤,
//! 데이터그램 하나를 페이로드 하나로 취급하여 콜백에 전달합니다.
//!
//! 소켓은 수신 태스크가 소유합니다. 정지 시 취소 신호가 진행 중인
//! `recv_from`을 즉시 깨우고, 태스크가 끝나면서 소켓이 닫힙니다.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use asterix_core::pipeline::BoxFuture;
use asterix_core::types::ReceiverMode;

use super::{
    IngestSource, PayloadCallback, SourceRuntime, SourceState, SourceStatsSnapshot, StopReason,
};
use crate::config::{SourceOptions, UdpReceiverConfig};
use crate::error::ReceiverError;

/// UDP 소켓 수집 소스
pub struct SocketSource {
    config: UdpReceiverConfig,
    options: SourceOptions,
    callback: PayloadCallback,
    runtime: Arc<SourceRuntime>,
}

impl SocketSource {
    /// 새 소스를 생성합니다. 소켓은 `start()`에서 열립니다.
    pub fn new(config: UdpReceiverConfig, options: SourceOptions, callback: PayloadCallback) -> Self {
        Self {
            config,
            options,
            callback,
            runtime: Arc::new(SourceRuntime::new(ReceiverMode::Udp)),
        }
    }

    /// 소스 설정을 반환합니다.
    pub fn config(&self) -> &UdpReceiverConfig {
        &self.config
    }

    async fn start_inner(&self) -> Result<(), ReceiverError> {
        self.runtime.ensure_startable()?;
        let addr = self.config.socket_addr()?;
        let group = self.config.multicast_group()?;

        let socket = open_socket(addr, group, &self.options)?;
        info!(
            bind = %addr,
            multicast = ?group,
            "udp source listening"
        );

        self.runtime.mark_running();
        let task = tokio::spawn(receive_loop(
            socket,
            Arc::clone(&self.runtime),
            Arc::clone(&self.callback),
            self.options.clone(),
        ));
        self.runtime.attach_task(task);
        Ok(())
    }
}

impl IngestSource for SocketSource {
    fn mode(&self) -> ReceiverMode {
        ReceiverMode::Udp
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ReceiverError>> {
        Box::pin(self.start_inner())
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.runtime.shutdown(self.options.stop_timeout, "udp").await;
            info!(port = self.config.port, "udp source stopped");
        })
    }

    fn is_running(&self) -> bool {
        self.runtime.is_running()
    }

    fn state(&self) -> SourceState {
        self.runtime.state()
    }

    fn stats(&self) -> SourceStatsSnapshot {
        self.runtime.stats().snapshot()
    }
}

/// 바인드와 멀티캐스트 가입을 하나의 원자적 단계로 수행합니다.
///
/// 가입에 실패하면 소켓은 반환되지 않고 그대로 닫힙니다.
fn open_socket(
    addr: SocketAddr,
    group: Option<IpAddr>,
    options: &SourceOptions,
) -> Result<UdpSocket, ReceiverError> {
    let bind_err = |e: io::Error| ReceiverError::Bind {
        addr: addr.to_string(),
        reason: e.to_string(),
    };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;

    // 같은 그룹을 여러 프로세스가 수신할 수 있도록 멀티캐스트일 때만 허용
    if group.is_some() {
        socket.set_reuse_address(true).map_err(bind_err)?;
    }

    if let Err(e) = socket.set_recv_buffer_size(options.recv_buffer_size) {
        warn!(
            error = %e,
            requested_size = options.recv_buffer_size,
            "failed to set udp SO_RCVBUF"
        );
    }

    socket.bind(&addr.into()).map_err(bind_err)?;

    if let Some(group) = group {
        join_group(&socket, addr.ip(), group).map_err(|e| ReceiverError::Multicast {
            group: group.to_string(),
            reason: e.to_string(),
        })?;
        debug!(%group, "joined multicast group");
    }

    socket.set_nonblocking(true).map_err(bind_err)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(bind_err)
}

fn join_group(socket: &Socket, bind_ip: IpAddr, group: IpAddr) -> io::Result<()> {
    match (group, bind_ip) {
        (IpAddr::V4(group), IpAddr::V4(bind)) => {
            // 그룹 주소 자체에 바인드한 경우 인터페이스는 커널이 선택
            let iface = if bind.is_multicast() {
                Ipv4Addr::UNSPECIFIED
            } else {
                bind
            };
            socket.join_multicast_v4(&group, &iface)
        }
        (IpAddr::V6(group), IpAddr::V6(_)) => socket.join_multicast_v6(&group, 0),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "multicast group and bind address families differ",
        )),
    }
}

async fn receive_loop(
    socket: UdpSocket,
    runtime: Arc<SourceRuntime>,
    callback: PayloadCallback,
    options: SourceOptions,
) {
    let cancel = runtime.cancel_token();
    let stats = Arc::clone(runtime.stats());
    let mut buf = vec![0u8; options.max_datagram_size];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((0, _)) => stats.record_received(),
                Ok((len, peer)) => {
                    stats.record_received();
                    stats.record_emitted(len);
                    trace!(%peer, len, "datagram received");
                    callback(Bytes::copy_from_slice(&buf[..len]));
                }
                Err(e) => {
                    // 정지 요청 이후의 에러는 정상적인 종료 과정
                    if cancel.is_cancelled() || !runtime.is_running() {
                        break;
                    }
                    stats.record_error();
                    warn!(error = %e, "udp receive error, retrying after backoff");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(options.error_backoff) => {}
                    }
                }
            }
        }
    }

    drop(socket);
    runtime.mark_finished(StopReason::Manual);
    debug!("udp receive loop exited");
}
