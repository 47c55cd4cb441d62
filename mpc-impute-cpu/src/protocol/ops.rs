use crate::{
    error::Error,
    execution::session::{MpcSession, NetworkSession},
    network::value::{NetworkInt, NetworkValue},
    protocol::prf::{Prf, PrfSeed},
    shares::{IntRing2k, RingElement, Share},
};
use eyre::{eyre, Result};
use itertools::izip;
use mpc_impute_common::NUM_PARTIES;
use tracing::instrument;

/// Exchanges PRF seeds around the ring: our seed goes to the next party, the
/// previous party's seed comes back.
#[instrument(level = "trace", target = "mpc::network", skip_all)]
pub async fn setup_replicated_prf(session: &NetworkSession, my_seed: PrfSeed) -> Result<Prf> {
    session.send_next(NetworkValue::PrfKey(my_seed)).await?;
    let other_seed = match session.receive_prev().await {
        Ok(NetworkValue::PrfKey(seed)) => seed,
        Ok(_) => return Err(Error::UnexpectedValue("PrfKey").into()),
        Err(e) => return Err(eyre!("Could not receive PRF seed from previous party: {e}")),
    };
    Ok(Prf::new(my_seed, other_seed))
}

/// Replicated sharing of one input per party in a single round.
///
/// Every party draws a zero share per contributor slot and adds its own input
/// to its own slot. Sending the resulting additive pieces to the next party
/// completes the replication.
#[instrument(level = "trace", target = "mpc::network", skip_all)]
pub async fn share_inputs(
    session: &mut MpcSession,
    own_input: RingElement<u64>,
) -> Result<[Share<u64>; NUM_PARTIES]> {
    let own_index = session.own_role().index();
    let pieces: Vec<RingElement<u64>> = (0..NUM_PARTIES)
        .map(|slot| {
            let zero = session.prf.gen_zero_share::<u64>();
            if slot == own_index {
                zero + own_input
            } else {
                zero
            }
        })
        .collect();

    let network = &session.network_session;
    network.send_next(u64::new_network_vec(pieces.clone())).await?;
    let received = network
        .receive_prev()
        .await
        .and_then(u64::into_vec)
        .map_err(|e| eyre!("Error in receiving in share operation: {}", e))?;
    if received.len() != NUM_PARTIES {
        return Err(Error::InvalidMessageSize.into());
    }

    izip!(pieces, received)
        .map(|(a, b)| Share::new(a, b))
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| Error::InvalidMessageSize.into())
}

/// Opens replicated shares: each party sends its `b` component to the next
/// party and completes the sum with the component received from the previous.
#[instrument(level = "trace", target = "mpc::network", skip_all)]
pub async fn open_ring<T: IntRing2k + NetworkInt>(
    session: &mut MpcSession,
    shares: &[Share<T>],
) -> Result<Vec<T>> {
    let network = &session.network_session;
    let message = if shares.len() == 1 {
        T::new_network_element(shares[0].b)
    } else {
        T::new_network_vec(shares.iter().map(|x| x.b).collect())
    };

    network.send_next(message).await?;

    let c = network
        .receive_prev()
        .await
        .and_then(T::into_vec)
        .map_err(|e| eyre!("Error in receiving in open operation: {}", e))?;
    if c.len() != shares.len() {
        return Err(Error::InvalidMessageSize.into());
    }
    metrics::counter!("mpc.reveal.rounds").increment(1);

    Ok(izip!(shares.iter(), c.iter())
        .map(|(s, c)| (s.a + s.b + c).convert())
        .collect())
}
