use std::time::Duration;

use anyhow::{Context, Result};
use chat_multiplexer::{
    ChatClient, ClientOptions, Frame,
    frame::{read_frame, write_frame},
    messages::{GroupsResp, tags},
};
use prost::Message;
use tokio::{net::TcpListener, time::timeout};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn plain_tcp_session_round_trip() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?.to_string();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let request = read_frame(&mut socket)
            .await?
            .context("client hung up before asking")?;
        assert_eq!(request.tag, tags::GET_GROUPS);
        let resp = GroupsResp {
            group_names: vec!["teamA".into(), "teamB".into()],
        };
        write_frame(&mut socket, &Frame::new(tags::GET_GROUPS, resp.encode_to_vec())).await?;
        Ok::<_, anyhow::Error>(())
    });

    let client = ChatClient::connect(&address, None, ClientOptions::default()).await?;
    let groups = timeout(WAIT, client.list_groups()).await??;
    assert_eq!(groups, vec!["teamA", "teamB"]);

    // The server task returning closes the socket.
    timeout(WAIT, server).await???;
    timeout(WAIT, client.disconnected())
        .await
        .context("client should notice the closed socket")?;
    assert!(!client.is_connected());

    client.shutdown().await;
    Ok(())
}
