//! Root stack: nests the control plane and every node pool

use std::collections::BTreeSet;

use serde_json::json;

use crate::assembler::{Context, RenderedStack};
use crate::document::{Output, Parameter, Resource, Template};
use crate::error::Result;
use crate::reference::ReferenceGraph;
use crate::stack::StackId;

pub const TEMPLATE_BASE_URL: &str = "TemplateBaseURL";

/// Build the root stack and the `(owner, output)` pairs its summary mirrors
pub(crate) fn build(
    ctx: &Context<'_>,
    graph: &ReferenceGraph,
    pools: &[RenderedStack],
) -> Result<(Template, BTreeSet<(StackId, String)>)> {
    let mut template = Template::new(format!(
        "clustack cluster {}",
        ctx.spec.cluster_name
    ));
    template.add_parameter(
        TEMPLATE_BASE_URL,
        Parameter::string("URL prefix under which every nested stack document is uploaded"),
    );
    template.add_parameter(
        "ImageId",
        Parameter::of_type("AWS::EC2::Image::Id", "AMI of every instance in the cluster")
            .with_default(ctx.spec.ami_id.clone()),
    );

    template.add_resource(
        StackId::ControlPlane.logical_name(),
        nested_stack(&StackId::ControlPlane),
    )?;

    for pool in pools {
        let mut resource = nested_stack(&pool.id);
        // Every pool receives the control plane's name, imports or not
        let mut owners = graph.import_owners(&pool.id);
        owners.insert(StackId::ControlPlane);
        for owner in owners {
            let parameter = owner.name_parameter();
            let value = json!({ "Fn::GetAtt": [owner.logical_name(), "Outputs.StackName"] });
            if let Some(parameters) = resource
                .properties
                .get_mut("Parameters")
                .and_then(|p| p.as_object_mut())
            {
                parameters.insert(parameter, value);
            }
            resource = resource.depends_on(owner.logical_name());
        }
        template.add_resource(pool.id.logical_name(), resource)?;
    }

    let mut summary = BTreeSet::new();
    for (owner, export) in graph.all_exports() {
        let logical = owner.logical_name();
        template.add_output(
            format!("{}{}", logical, export.output),
            Output::new(json!({ "Fn::GetAtt": [logical, format!("Outputs.{}", export.output)] })),
        )?;
        summary.insert((owner.clone(), export.output.clone()));
    }

    Ok((template, summary))
}

fn nested_stack(id: &StackId) -> Resource {
    Resource::new("AWS::CloudFormation::Stack")
        .property(
            "TemplateURL",
            json!({ "Fn::Sub": format!("${{{}}}/{}/stack.json", TEMPLATE_BASE_URL, id.name()) }),
        )
        .property("Parameters", json!({ "ImageId": { "Ref": "ImageId" } }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::compile;
    use crate::payload::TemplatePayloads;
    use clustack_core::load_cluster;

    #[test]
    fn test_root_nests_every_stack() {
        let spec = load_cluster(
            br#"
clusterName: test-cluster
region: us-west-1
amiId: ami-123
availabilityZone: us-west-1a
worker:
  nodePools:
  - name: pool-1
"#,
        )
        .unwrap();
        let stacks = compile(&spec, &TemplatePayloads::builtin()).unwrap();
        let root = stacks.root().unwrap();

        assert_eq!(root.parameters["ImageId"].default.as_deref(), Some("ami-123"));
        let control_plane = root.resource("Controlplane").unwrap();
        assert_eq!(
            control_plane.properties["TemplateURL"],
            json!({"Fn::Sub": "${TemplateBaseURL}/control-plane/stack.json"})
        );

        let pool = root.resource("Pool1").unwrap();
        assert_eq!(pool.depends_on, vec!["Controlplane"]);
        assert_eq!(
            pool.properties["Parameters"]["ControlPlaneStackName"],
            json!({"Fn::GetAtt": ["Controlplane", "Outputs.StackName"]})
        );
        assert_eq!(
            pool.properties["TemplateURL"],
            json!({"Fn::Sub": "${TemplateBaseURL}/pool-1/stack.json"})
        );

        assert_eq!(
            root.outputs["ControlplaneSecurityGroupWorker"].value,
            json!({"Fn::GetAtt": ["Controlplane", "Outputs.SecurityGroupWorker"]})
        );
        assert_eq!(
            root.outputs["Pool1WorkerIAMRoleArn"].value,
            json!({"Fn::GetAtt": ["Pool1", "Outputs.WorkerIAMRoleArn"]})
        );
        assert!(root.outputs.values().all(|o| o.export.is_none()));
    }
}
