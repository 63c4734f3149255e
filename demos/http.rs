use std::sync::Arc;
use std::time::Duration;

use surge::{
    Context, HttpResponse, ReqwestClient, RequestOptions, Reporter, Runner, Scenario,
    ScenarioError, Stage, StageSchedule, StdoutReporter,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let scenario = Scenario::builder()
        .name("resource mix")
        .action(|ctx: Context| async move {
            let options = RequestOptions {
                redirects: 0,
                discard_response_body: true,
            };

            // A few known-good resources, plus one that should 404.
            let resources: [(&str, &str, u16); 3] = [
                ("/registries", "timing_registry", 200),
                ("/meta", "timing_meta", 200),
                ("/foofoo/roflmao", "timing_404", 404),
            ];
            for (path, trend, expected) in resources {
                let res = ctx.get(path, &options).await?;
                ctx.check(
                    &res,
                    &[(trend, &move |r: &HttpResponse| r.status == expected)],
                );
                ctx.trend(trend, res.timings.total_ms());

                // Sleep a bit so that our rps go up with our VUs.
                ctx.sleep(Duration::from_millis(10)).await;
            }
            Ok::<(), ScenarioError>(())
        })
        .build();

    let runner = Runner::builder()
        .scenario(scenario)
        .schedule(StageSchedule::new(vec![
            // Over 10s, ramp up from 0 users to 10, hold for 60s,
            // then tap the accelerator up to 50 and dawdle up there a bit.
            Stage::new(Duration::from_secs(10), 10),
            Stage::new(Duration::from_secs(60), 10),
            Stage::new(Duration::from_secs(10), 50),
            Stage::new(Duration::from_secs(60), 50),
        ])?)
        .base_url("http://localhost:8000")
        .client(Arc::new(ReqwestClient::new()?))
        .build();

    let report = runner.run().await?;
    StdoutReporter.report(report).await?;
    Ok(())
}
