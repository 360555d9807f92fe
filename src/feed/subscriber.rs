//! Feed Subscriber
//!
//! Subscribes to the quote publisher over UDP, renews the subscription every
//! period and pushes each received datagram through the session.
//!
//! A subscription is a 6-byte datagram to the publisher: the listener's
//! IPv4 address followed by its port (big-endian).

use chrono::Utc;
use eyre::{eyre, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::wire::{decode_datagram, RECORD_SIZE};
use crate::cartographer::QuoteEvent;
use crate::config::Config;
use crate::session::{ArbitrageSession, Opportunity};

/// Subscription message for a listener bound at `addr`
pub fn subscription_message(addr: SocketAddr) -> Result<[u8; 6]> {
    let SocketAddr::V4(v4) = addr else {
        return Err(eyre!("cannot subscribe from IPv6 address {}", addr));
    };

    let mut msg = [0u8; 6];
    msg[..4].copy_from_slice(&v4.ip().octets());
    msg[4..].copy_from_slice(&v4.port().to_be_bytes());
    Ok(msg)
}

/// UDP listener for the quote feed
pub struct FeedSubscriber {
    socket: UdpSocket,
    local_addr: SocketAddr,
    publisher: SocketAddr,
    subscription_period: Duration,
    buffer: Vec<u8>,
}

impl FeedSubscriber {
    /// Bind the listener socket
    pub async fn bind(config: &Config) -> Result<Self> {
        let socket = UdpSocket::bind(config.listen_addr).await?;
        let local_addr = socket.local_addr()?;
        info!("Created listener socket {} in subscriber", local_addr);

        Ok(Self {
            socket,
            local_addr,
            publisher: config.publisher_addr,
            subscription_period: config.subscription_period(),
            buffer: vec![0u8; config.recv_buffer_bytes.max(RECORD_SIZE)],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send the subscription message to the publisher
    pub async fn subscribe(&self) -> Result<()> {
        let msg = subscription_message(self.local_addr)?;
        self.socket.send_to(&msg, self.publisher).await?;
        info!("Subscribed to publisher {}", self.publisher);
        Ok(())
    }

    /// Run subscription windows back to back, forever
    pub async fn run<F>(&mut self, session: &mut ArbitrageSession, mut on_opportunity: F) -> Result<()>
    where
        F: FnMut(&Opportunity),
    {
        loop {
            self.run_window(session, &mut on_opportunity).await?;
        }
    }

    /// One subscription window: clear the graph, subscribe, then ingest
    /// datagrams until the subscription period has elapsed.
    pub async fn run_window<F>(&mut self, session: &mut ArbitrageSession, on_opportunity: &mut F) -> Result<()>
    where
        F: FnMut(&Opportunity),
    {
        session.renew();
        self.subscribe().await?;

        let deadline = Instant::now() + self.subscription_period;

        loop {
            let len = match timeout_at(deadline, self.socket.recv(&mut self.buffer)).await {
                Err(_) => break,
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    warn!("Receive failed: {}", e);
                    continue;
                }
            };

            let events = decode_events(&self.buffer[..len]);
            debug!("Received {} bytes, {} quotes", len, events.len());

            if let Some(opportunity) = session.process_batch(&events, Utc::now()) {
                on_opportunity(&opportunity);
            }
        }

        let stats = session.stats();
        info!(
            "{} subscription expired: {} applied, {} out of sequence, {} rejected, {} evicted, {} opportunities",
            self.local_addr,
            stats.applied,
            stats.out_of_sequence,
            stats.rejected,
            stats.evicted,
            stats.opportunities
        );

        Ok(())
    }
}

/// Decode a datagram, logging and dropping malformed records
pub fn decode_events(data: &[u8]) -> Vec<QuoteEvent> {
    decode_datagram(data)
        .enumerate()
        .filter_map(|(idx, record)| match record {
            Ok(event) => Some(event),
            Err(e) => {
                let start = idx * RECORD_SIZE;
                let end = (start + RECORD_SIZE).min(data.len());
                warn!(
                    "Skipping malformed record #{}: {} (0x{})",
                    idx,
                    e,
                    hex::encode(&data[start..end])
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::Currency;
    use crate::config::DetectorSettings;
    use crate::feed::encode_record;

    #[test]
    fn test_subscription_message() {
        let msg = subscription_message("127.0.0.1:50411".parse().unwrap()).unwrap();
        assert_eq!(msg, [127, 0, 0, 1, 0xC4, 0xEB]);

        assert!(subscription_message("[::1]:5000".parse().unwrap()).is_err());
    }

    #[test]
    fn test_decode_events_drops_bad_records() {
        let event = QuoteEvent::new(Currency::USD, "EUR".parse().unwrap(), 0.92, Utc::now());
        let mut data = encode_record(&event).to_vec();
        let mut bad = encode_record(&event);
        bad[8] = 0x07;
        data.extend_from_slice(&bad);
        data.extend_from_slice(&encode_record(&event));

        let events = decode_events(&data);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].quote.as_str(), "EUR");
    }

    #[tokio::test]
    async fn test_window_subscribes_and_ingests() {
        let publisher = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let config = Config {
            publisher_addr: publisher.local_addr().unwrap(),
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            subscription_secs: 1,
            ..Config::default()
        };
        let mut subscriber = FeedSubscriber::bind(&config).await.unwrap();
        let mut session = ArbitrageSession::new(DetectorSettings::default());

        let listener = subscriber.local_addr();
        let feed = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let (len, from) = publisher.recv_from(&mut buf).await.unwrap();
            assert_eq!(from, listener);
            assert_eq!(&buf[..len], &subscription_message(listener).unwrap());

            let now = Utc::now();
            let mut datagram = Vec::new();
            for (base, quote, rate) in [("USD", "EUR", 0.9), ("EUR", "GBP", 0.8), ("GBP", "USD", 1.5)] {
                let event = QuoteEvent::new(base.parse().unwrap(), quote.parse().unwrap(), rate, now);
                datagram.extend_from_slice(&encode_record(&event));
            }
            publisher.send_to(&datagram, listener).await.unwrap();
        });

        let mut found = Vec::new();
        subscriber
            .run_window(&mut session, &mut |opp: &Opportunity| found.push(opp.clone()))
            .await
            .unwrap();
        feed.await.unwrap();

        assert_eq!(found.len(), 1);
        assert!(found[0].report.is_profitable(crate::brain::DEFAULT_TOLERANCE));
        assert_eq!(session.stats().applied, 3);
    }
}
